//! Response types for ingestion and questions

use serde::{Deserialize, Serialize};

use super::document::Chunk;

/// Answer returned when retrieval finds nothing
pub const NO_RELEVANT_INFO: &str =
    "I couldn't find relevant information in this document to answer the question.";

/// Answer substituted when the model returns an empty completion
pub const FALLBACK_ANSWER: &str = "I couldn't generate an answer from this document.";

/// Answer plus the chunks it was drawn from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    /// Generated answer
    pub answer: String,
    /// Retrieved chunks, in retrieval order
    pub source_documents: Vec<Chunk>,
}

impl AnswerResult {
    /// Create an answer with its sources
    pub fn new(answer: String, source_documents: Vec<Chunk>) -> Self {
        Self {
            answer,
            source_documents,
        }
    }

    /// Terminal result when retrieval returned nothing
    pub fn no_relevant_info() -> Self {
        Self {
            answer: NO_RELEVANT_INFO.to_string(),
            source_documents: Vec::new(),
        }
    }

    /// Whether this is the canonical empty-retrieval result
    pub fn is_no_relevant_info(&self) -> bool {
        self.source_documents.is_empty() && self.answer == NO_RELEVANT_INFO
    }
}

/// What the user sees after asking a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    /// Redacted answer, or a canned message when the request failed
    pub answer: String,
    /// Retrieved chunks (empty on failure)
    pub source_documents: Vec<Chunk>,
    /// Whether the request failed or was rejected
    pub degraded: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl Reply {
    /// Successful reply
    pub fn answered(result: AnswerResult, processing_time_ms: u64) -> Self {
        Self {
            answer: result.answer,
            source_documents: result.source_documents,
            degraded: false,
            processing_time_ms,
        }
    }

    /// Failed or rejected request, shown as a stable message
    pub fn canned(message: &str, processing_time_ms: u64) -> Self {
        Self {
            answer: message.to_string(),
            source_documents: Vec::new(),
            degraded: true,
            processing_time_ms,
        }
    }
}

/// Summary of a completed ingestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    /// Document identifier
    pub doc_id: String,
    /// Original filename
    pub filename: String,
    /// Number of chunks indexed
    pub chunks: usize,
    /// Number of pages (if applicable)
    pub pages: Option<u32>,
    /// SHA-256 of the file bytes
    pub content_hash: String,
    /// Whether an existing index was reused instead of rebuilt
    pub cached: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}
