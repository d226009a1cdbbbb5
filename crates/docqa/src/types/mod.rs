//! Core types for the document QA system

pub mod document;
pub mod response;

pub use document::{Chunk, ChunkMetadata};
pub use response::{AnswerResult, IngestReport, Reply, FALLBACK_ANSWER, NO_RELEVANT_INFO};
