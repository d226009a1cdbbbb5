//! docqa command line
//!
//! Run with: cargo run -p docqa -- ingest handbook.pdf

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa::{DocQa, DocQaConfig, Reply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Ask questions about a document")]
struct Cli {
    /// TOML configuration file (defaults plus DOCQA_* environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a PDF, DOCX or text file
    Ingest { file: PathBuf },
    /// Ask one question about an indexed document
    Ask { doc_id: String, question: String },
    /// Index a file, then answer questions from stdin until EOF or `exit`
    Chat { file: PathBuf },
    /// Delete uploads and indexes older than the configured TTL
    Cleanup,
    /// Check that the embedding and language model services respond
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DocQaConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DocQaConfig::from_env()?,
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  - Embedding backend: {:?}", config.embeddings.backend);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);

    let qa = DocQa::new(config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let report = qa.ingest_file(&file).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Indexed {} as {} ({} chunks{})",
                    report.filename,
                    report.doc_id,
                    report.chunks,
                    if report.cached { ", cached" } else { "" }
                );
            }
        }
        Commands::Ask { doc_id, question } => {
            let reply = qa.ask(&doc_id, &question).await;
            print_reply(&reply, cli.json)?;
        }
        Commands::Chat { file } => {
            let report = qa.ingest_file(&file).await?;
            println!("Ready: {} ({} chunks). Type `exit` to quit.", report.doc_id, report.chunks);
            chat(&qa, &report.doc_id, cli.json).await?;
        }
        Commands::Cleanup => {
            let report = qa.cleanup().await?;
            if cli.json {
                let removed: Vec<String> = report.removed.iter().map(|p| p.display().to_string()).collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "removed": removed,
                        "failed": report.failed,
                        "skipped": report.skipped
                    })
                );
            } else {
                for path in &report.removed {
                    println!("removed {}", path.display());
                }
                println!(
                    "{} removed, {} failed, {} in use",
                    report.removed.len(),
                    report.failed,
                    report.skipped
                );
            }
        }
        Commands::Health => {
            let health = qa.health().await;
            println!(
                "embedder: {}\nllm: {}",
                if health.embedder { "ok" } else { "unreachable" },
                if health.llm { "ok" } else { "unreachable" }
            );
            if !health.is_healthy() {
                anyhow::bail!("model services unavailable at {}", qa.config().llm.base_url);
            }
        }
    }

    Ok(())
}

async fn chat(qa: &DocQa, doc_id: &str, json: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = qa.ask(doc_id, question).await;
        print_reply(&reply, json)?;
    }

    Ok(())
}

fn print_reply(reply: &Reply, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
        return Ok(());
    }

    println!("{}", reply.answer);
    if !reply.source_documents.is_empty() {
        println!("\nSources:");
        for (i, chunk) in reply.source_documents.iter().enumerate() {
            let preview: String = chunk.text.chars().take(80).collect();
            println!("  [{}] {}: {}", i + 1, chunk.format_citation(), preview.replace('\n', " "));
        }
    }
    println!();
    Ok(())
}
