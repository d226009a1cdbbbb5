//! Ingest a document and answer questions about it without network services

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use docqa::config::EmbeddingBackend;
use docqa::{
    Answerer, DocQa, DocQaConfig, EmbeddingProvider, HashingEmbedder, Ingestor, LlmProvider,
    MemoryRegistry, Result, TextChunker, FALLBACK_ANSWER, NO_RELEVANT_INFO,
};

const PARAGRAPH_ONE: &str = "Welcome to the Northwind employee handbook. This guide explains how \
the company is organised, who to contact for help, and where to find the tools you need on your \
first day. Please read it carefully and keep it nearby during onboarding.";

const PARAGRAPH_TWO: &str = "Vacation policy: every full-time employee receives twenty-five days \
of paid vacation per calendar year. Unused vacation days can be carried over until the end of \
March. Requests for vacation must be approved by your manager two weeks in advance.";

const PARAGRAPH_THREE: &str = "Expense reports are submitted through the finance portal before the \
fifth working day of each month. Receipts must be attached for any purchase above fifty euros, \
and travel must be booked through the approved agency.";

/// Returns queued completions in order and records every prompt
struct ScriptedLlm {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock()[i].clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        Ok(self.replies.lock().pop().unwrap_or_default())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn handbook(dir: &Path) -> PathBuf {
    let path = dir.join("handbook.txt");
    let text = format!("{}\n\n{}\n\n{}\n", PARAGRAPH_ONE, PARAGRAPH_TWO, PARAGRAPH_THREE);
    std::fs::write(&path, text).unwrap();
    path
}

fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbedder::new(384).unwrap())
}

fn service(data_dir: &Path, llm: Arc<ScriptedLlm>) -> DocQa {
    let mut config = DocQaConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.embeddings.backend = EmbeddingBackend::Hashing;
    config.embeddings.dimensions = 384;
    DocQa::with_providers(config, embedder(), llm).unwrap()
}

#[tokio::test]
async fn test_answers_from_the_paragraph_that_holds_the_answer() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let persist_dir = store.path().join("handbook");

    let embedder = embedder();
    let ingestor = Ingestor::new(TextChunker::new(500, 50).unwrap(), embedder.clone(), 8);
    let report = ingestor.ingest(&handbook(src.path()), &persist_dir).await.unwrap();
    assert!(report.chunks >= 2);

    let llm = ScriptedLlm::new(&["Employees receive twenty-five days of paid vacation per year."]);
    let answerer = Answerer::new(
        embedder,
        llm.clone(),
        Arc::new(MemoryRegistry::default()),
        DocQaConfig::default().retrieval,
    );

    let result = answerer
        .answer("How many vacation days do employees get?", &persist_dir, &report.doc_id)
        .await
        .unwrap();

    assert!(result
        .source_documents
        .iter()
        .any(|chunk| chunk.text.contains("twenty-five days of paid vacation")));
    assert!(!result.answer.trim().is_empty());
    assert_ne!(result.answer, FALLBACK_ANSWER);
    assert_eq!(llm.calls(), 1);
    assert!(llm.prompt(0).contains("Vacation policy"));
}

#[tokio::test]
async fn test_empty_document_answers_without_calling_the_model() {
    let src = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::new(&["unused"]);
    let qa = service(data.path(), llm.clone());

    let file = src.path().join("blank.txt");
    std::fs::write(&file, "\n\n   \n").unwrap();
    let report = qa.ingest_file(&file).await.unwrap();
    assert_eq!(report.chunks, 0);

    let reply = qa.ask(&report.doc_id, "What does it say?").await;
    assert_eq!(reply.answer, NO_RELEVANT_INFO);
    assert!(reply.source_documents.is_empty());
    assert!(!reply.degraded);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_blank_completion_becomes_fallback() {
    let src = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::new(&["  \n\t "]);
    let qa = service(data.path(), llm.clone());

    let report = qa.ingest_file(&handbook(src.path())).await.unwrap();
    let reply = qa.ask(&report.doc_id, "When are expense reports due?").await;

    assert_eq!(reply.answer, FALLBACK_ANSWER);
    assert!(!reply.source_documents.is_empty());
}

#[tokio::test]
async fn test_follow_up_questions_see_earlier_turns() {
    let src = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::new(&["Twenty-five days per year.", "Until the end of March."]);
    let qa = service(data.path(), llm.clone());

    let report = qa.ingest_file(&handbook(src.path())).await.unwrap();
    qa.ask(&report.doc_id, "How much vacation do I get?").await;
    let reply = qa.ask(&report.doc_id, "Can I carry it over?").await;

    assert_eq!(reply.answer, "Until the end of March.");
    assert!(!llm.prompt(0).contains("CONVERSATION SO FAR"));
    assert!(llm.prompt(1).contains("User: How much vacation do I get?"));
    assert!(llm.prompt(1).contains("Assistant: Twenty-five days per year."));
    assert_eq!(qa.history(&report.doc_id).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_questions_during_reingest_never_see_a_missing_index() {
    let src = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let mut config = DocQaConfig::default();
    config.storage.data_dir = data.path().to_path_buf();
    // Zero TTL disables cache hits, so every ingest rebuilds the index
    config.storage.ttl_secs = 0;
    config.embeddings.dimensions = 384;
    let qa = DocQa::with_providers(config, embedder(), ScriptedLlm::new(&[])).unwrap();

    let file = handbook(src.path());
    let report = qa.ingest_file(&file).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let qa = qa.clone();
        let doc_id = report.doc_id.clone();
        let file = file.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                qa.ingest_file(&file).await.map(|report| {
                    assert!(!report.cached);
                    None
                })
            } else {
                Ok(Some(qa.ask(&doc_id, "What is the vacation policy?").await))
            }
        }));
    }

    for task in tasks {
        if let Some(reply) = task.await.unwrap().unwrap() {
            assert!(!reply.degraded, "unexpected failure: {}", reply.answer);
            assert!(!reply.source_documents.is_empty());
        }
    }
}
