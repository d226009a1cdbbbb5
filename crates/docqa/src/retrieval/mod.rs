//! Per-document vector index with similarity and diversity search

pub mod index;
pub mod mmr;

pub use index::{SearchMode, VectorIndex, INDEX_FILE, INDEX_VERSION};
pub use mmr::{cosine_similarity, mmr_rerank, MmrCandidate};
