//! Chunk types with source tracking

use serde::{Deserialize, Serialize};

/// Where a chunk came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Original filename of the source document
    pub source: String,
    /// Page the chunk starts on (1-indexed, paginated formats only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Byte offset of the chunk start in the loaded text
    pub char_start: usize,
    /// Byte offset one past the chunk end in the loaded text
    pub char_end: usize,
}

/// A contiguous span of document text, the unit of embedding and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// `{doc_id}-{index}`
    pub id: String,
    /// Owning document
    pub doc_id: String,
    /// Text content
    pub text: String,
    /// Position within the document
    pub index: u32,
    /// Source information for attribution
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk; the id is derived from document and position
    pub fn new(doc_id: &str, index: u32, text: String, metadata: ChunkMetadata) -> Self {
        Self {
            id: format!("{}-{}", doc_id, index),
            doc_id: doc_id.to_string(),
            text,
            index,
            metadata,
        }
    }

    /// Format source for display
    pub fn format_citation(&self) -> String {
        match self.metadata.page {
            Some(page) => format!("{}, Page {}", self.metadata.source, page),
            None => self.metadata.source.clone(),
        }
    }
}
