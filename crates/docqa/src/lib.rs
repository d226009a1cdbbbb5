//! docqa: question answering over a single uploaded document
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! per-document vector index. Questions are answered by a language model
//! strictly from the most relevant, mutually diverse chunks, with the
//! conversation so far kept per document.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod memory;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod security;
pub mod storage;
pub mod types;

pub use config::DocQaConfig;
pub use error::{Error, Result};
pub use generation::Answerer;
pub use ingestion::{Ingestor, Loader, TextChunker};
pub use memory::{MemoryHandle, MemoryRegistry, Turn};
pub use processing::{DocQa, HealthStatus};
pub use providers::{EmbeddingProvider, HashingEmbedder, LlmProvider};
pub use retrieval::{SearchMode, VectorIndex};
pub use security::{redact_sensitive_data, sanitize_query, QueryGuard, Redactor};
pub use types::{
    document::{Chunk, ChunkMetadata},
    response::{AnswerResult, IngestReport, Reply, FALLBACK_ANSWER, NO_RELEVANT_INFO},
};
