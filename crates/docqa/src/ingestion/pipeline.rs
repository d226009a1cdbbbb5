//! Ingestion pipeline orchestration

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retrieval::VectorIndex;
use crate::storage::doc_id_for;
use crate::types::{Chunk, IngestReport};

use super::chunker::TextChunker;
use super::loader::{hash_bytes, Loader};

/// An embedded document not yet written to disk
#[derive(Debug)]
pub struct PreparedIndex {
    pub doc_id: String,
    pub filename: String,
    pub content_hash: String,
    pub pages: Option<u32>,
    pub index: VectorIndex,
    started: Instant,
}

/// Turns a file into a persisted vector index
pub struct Ingestor {
    /// Text chunker
    chunker: TextChunker,
    /// Shared embedder
    embedder: Arc<dyn EmbeddingProvider>,
    /// Texts per embedding call
    batch_size: usize,
}

impl Ingestor {
    pub fn new(chunker: TextChunker, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            chunker,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(
        chunking: &ChunkingConfig,
        embeddings: &EmbeddingConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(chunking.chunk_size, chunking.chunk_overlap)?;
        Ok(Self::new(chunker, embedder, embeddings.batch_size))
    }

    /// Load, chunk and embed `file_path`, then replace the index at `persist_dir`.
    ///
    /// The index is durably written before this returns. On failure the
    /// previous index at `persist_dir`, if any, is left untouched.
    pub async fn ingest(&self, file_path: &Path, persist_dir: &Path) -> Result<IngestReport> {
        let prepared = self.prepare(file_path).await?;
        self.commit(prepared, persist_dir).await
    }

    /// Load, chunk and embed `file_path` into an in-memory index.
    ///
    /// Nothing is written to disk, so dropping the future part way leaves
    /// no trace.
    pub async fn prepare(&self, file_path: &Path) -> Result<PreparedIndex> {
        let started = Instant::now();

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::unsupported(format!("{} has no file name", file_path.display())))?
            .to_string();

        let data = tokio::fs::read(file_path).await?;
        let content_hash = hash_bytes(&data);
        let doc_id = doc_id_for(&filename, &content_hash);
        let loader = Loader::for_path(file_path);

        tracing::info!(doc_id = %doc_id, filename = %filename, ?loader, "Ingesting document");

        let (chunks, pages) = {
            let chunker = self.chunker.clone();
            let doc_id = doc_id.clone();
            let filename = filename.clone();
            tokio::task::spawn_blocking(move || -> Result<(Vec<Chunk>, Option<u32>)> {
                let doc = loader.load_bytes(&filename, &data)?;
                Ok((chunker.split(&doc_id, &doc), doc.total_pages))
            })
            .await??
        };

        let vectors = self.embed_chunks(&chunks).await?;
        let index = VectorIndex::build(chunks, vectors, self.embedder.name(), self.embedder.dimensions())?;

        Ok(PreparedIndex {
            doc_id,
            filename,
            content_hash,
            pages,
            index,
            started,
        })
    }

    /// Swap a prepared index into `persist_dir`
    pub async fn commit(&self, prepared: PreparedIndex, persist_dir: &Path) -> Result<IngestReport> {
        let PreparedIndex {
            doc_id,
            filename,
            content_hash,
            pages,
            index,
            started,
        } = prepared;
        let chunk_count = index.len();

        let target = persist_dir.to_path_buf();
        tokio::task::spawn_blocking(move || replace_index(&index, &target)).await??;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            doc_id = %doc_id,
            chunks = chunk_count,
            elapsed_ms = processing_time_ms,
            "Document indexed"
        );

        Ok(IngestReport {
            doc_id,
            filename,
            chunks: chunk_count,
            pages,
            content_hash,
            cached: false,
            processing_time_ms,
        })
    }

    /// Embed chunk texts in batches, preserving order
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self.embedder.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "batch {} returned {} embeddings for {} texts",
                    i,
                    embedded.len(),
                    batch.len()
                )));
            }
            tracing::debug!(batch = i, size = batch.len(), "Embedded batch");
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

/// Write `index` to a staging directory beside `persist_dir`, then swap it in.
///
/// The old directory is moved aside before the new one is renamed into place
/// and restored if that rename fails.
fn replace_index(index: &VectorIndex, persist_dir: &Path) -> Result<()> {
    let parent = match persist_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(&parent)?;
    index.persist(staging.path())?;

    let retired = tempfile::Builder::new().prefix(".retired-").tempdir_in(&parent)?;
    let retired_path = retired.path().join("index");
    let had_previous = persist_dir.exists();
    if had_previous {
        std::fs::rename(persist_dir, &retired_path)?;
    }

    if let Err(e) = std::fs::rename(staging.path(), persist_dir) {
        if had_previous {
            if let Err(restore) = std::fs::rename(&retired_path, persist_dir) {
                tracing::error!(
                    dir = %persist_dir.display(),
                    "Failed to restore previous index: {}",
                    restore
                );
            }
        }
        return Err(e.into());
    }

    // `retired` drops here and removes the previous index
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbedder;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::upstream("connection refused"))
        }

        fn dimensions(&self) -> usize {
            16
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn ingestor(embedder: Arc<dyn EmbeddingProvider>) -> Ingestor {
        Ingestor::new(TextChunker::new(200, 20).unwrap(), embedder, 4)
    }

    fn hashing() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingEmbedder::new(16).unwrap())
    }

    #[tokio::test]
    async fn test_ingest_text_file() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("Policy Notes.txt");
        std::fs::write(&file, "Refunds take 14 days.\n\n".repeat(30)).unwrap();

        let persist_dir = store.path().join("policy");
        let report = ingestor(hashing()).ingest(&file, &persist_dir).await.unwrap();

        assert!(report.doc_id.starts_with("policy_notes_"));
        assert_eq!(report.filename, "Policy Notes.txt");
        assert!(report.chunks > 1);
        assert!(!report.cached);
        assert_eq!(report.pages, None);

        let index = VectorIndex::open(&persist_dir).unwrap();
        assert_eq!(index.len(), report.chunks);
        assert_eq!(index.embed_model(), "hashing-16");
        assert!(index.chunks().all(|c| c.doc_id == report.doc_id));
    }

    #[tokio::test]
    async fn test_reingest_replaces_index_and_leaves_no_staging() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let persist_dir = store.path().join("doc");

        let first = src.path().join("a.txt");
        std::fs::write(&first, "alpha ".repeat(200)).unwrap();
        ingestor(hashing()).ingest(&first, &persist_dir).await.unwrap();

        let second = src.path().join("b.txt");
        std::fs::write(&second, "beta").unwrap();
        ingestor(hashing()).ingest(&second, &persist_dir).await.unwrap();

        let index = VectorIndex::open(&persist_dir).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.chunks().next().unwrap().text, "beta");

        let leftovers: Vec<_> = std::fs::read_dir(store.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("doc")]);
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_previous_index() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let persist_dir = store.path().join("doc");

        let good = src.path().join("good.txt");
        std::fs::write(&good, "Shipping takes three days.").unwrap();
        ingestor(hashing()).ingest(&good, &persist_dir).await.unwrap();

        let binary = src.path().join("image.png");
        std::fs::write(&binary, [0x89u8, b'P', b'N', b'G', 0, 0, 0, 0]).unwrap();
        let err = ingestor(hashing()).ingest(&binary, &persist_dir).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        let err = ingestor(Arc::new(FailingEmbedder)).ingest(&good, &persist_dir).await.unwrap_err();
        assert!(err.is_retryable());

        let index = VectorIndex::open(&persist_dir).unwrap();
        assert_eq!(index.chunks().next().unwrap().text, "Shipping takes three days.");
    }

    #[tokio::test]
    async fn test_empty_document_builds_empty_index() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("empty.txt");
        std::fs::write(&file, "   \n").unwrap();

        let persist_dir = store.path().join("empty");
        let report = ingestor(hashing()).ingest(&file, &persist_dir).await.unwrap();
        assert_eq!(report.chunks, 0);
        assert!(VectorIndex::open(&persist_dir).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_writes_nothing_until_commit() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("notes.txt");
        std::fs::write(&file, "Office hours are nine to five.").unwrap();
        let persist_dir = store.path().join("notes");

        let ingestor = ingestor(hashing());
        let prepared = ingestor.prepare(&file).await.unwrap();
        assert_eq!(prepared.index.len(), 1);
        assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 0);

        let report = ingestor.commit(prepared, &persist_dir).await.unwrap();
        assert_eq!(report.chunks, 1);
        assert!(VectorIndex::exists(&persist_dir));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = tempfile::tempdir().unwrap();
        let err = ingestor(hashing())
            .ingest(&store.path().join("nope.txt"), &store.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
