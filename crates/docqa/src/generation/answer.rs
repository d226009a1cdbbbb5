//! Retrieve-then-answer over a single document's index

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::memory::MemoryRegistry;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{SearchMode, VectorIndex};
use crate::types::{AnswerResult, Chunk, FALLBACK_ANSWER};

use super::prompt::PromptBuilder;

/// Answers questions strictly from retrieved document context
pub struct Answerer {
    /// Same embedder used at ingest time
    embedder: Arc<dyn EmbeddingProvider>,
    /// Language model
    llm: Arc<dyn LlmProvider>,
    /// Conversation memory, read for prompt history
    memory: Arc<MemoryRegistry>,
    /// k, fetch_k, lambda and context budget
    retrieval: RetrievalConfig,
    /// Whether prior turns go into the prompt
    include_history: bool,
}

impl Answerer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        memory: Arc<MemoryRegistry>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            llm,
            memory,
            retrieval,
            include_history: true,
        }
    }

    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    /// Answer `query` from the index at `persist_dir`.
    ///
    /// Returns the canned no-information result without calling the model
    /// when retrieval comes back empty. The model is called at most once.
    pub async fn answer(&self, query: &str, persist_dir: &Path, doc_id: &str) -> Result<AnswerResult> {
        let start = Instant::now();

        let dir = persist_dir.to_path_buf();
        let index = tokio::task::spawn_blocking(move || VectorIndex::open(&dir)).await??;

        // Vectors from another model are not comparable, even at equal dimensions
        if index.embed_model() != self.embedder.name() {
            tracing::warn!(
                doc_id,
                index_model = index.embed_model(),
                embedder = self.embedder.name(),
                "Index was built with a different embedder"
            );
            return Err(Error::EmbedderMismatch {
                index: index.embed_model().to_string(),
                query: self.embedder.name().to_string(),
            });
        }

        let query_vector = self.embedder.embed(query).await?;
        let results = index.search(
            &query_vector,
            self.retrieval.k,
            SearchMode::Diversity {
                fetch_k: self.retrieval.fetch_k,
                lambda: self.retrieval.lambda,
            },
        )?;

        if results.is_empty() {
            tracing::info!(doc_id, "No chunks retrieved, skipping generation");
            return Ok(AnswerResult::no_relevant_info());
        }

        let chunks: Vec<Chunk> = results.into_iter().map(|(chunk, _)| chunk).collect();
        let (context, included) = PromptBuilder::build_context(&chunks, self.retrieval.context_budget);

        let history = if self.include_history {
            self.memory.history(doc_id)
        } else {
            Vec::new()
        };
        let prompt = PromptBuilder::build_rag_prompt(query, &context, &history);

        tracing::debug!(
            doc_id,
            retrieved = chunks.len(),
            in_context = included,
            context_chars = context.chars().count(),
            history_turns = history.len(),
            "Prompt assembled"
        );

        let completion = self.llm.complete(&prompt).await?;
        let answer = match completion.trim() {
            "" => {
                tracing::warn!(doc_id, model = self.llm.model(), "Empty completion, using fallback");
                FALLBACK_ANSWER.to_string()
            }
            text => text.to_string(),
        };

        tracing::info!(
            doc_id,
            sources = chunks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Answer generated"
        );

        Ok(AnswerResult::new(answer, chunks))
    }
}
