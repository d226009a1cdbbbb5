//! Document ingestion: load, chunk, embed, index

mod chunker;
mod loader;
mod pipeline;

pub use chunker::{Span, TextChunker};
pub use loader::{hash_bytes, LoadedDocument, Loader, PageContent};
pub use pipeline::{Ingestor, PreparedIndex};
