//! Vector index persisted as a versioned JSON file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Chunk;

use super::mmr::{cosine_similarity, mmr_rerank, MmrCandidate};

/// File holding the index inside its directory
pub const INDEX_FILE: &str = "index.json";

/// Current on-disk format
pub const INDEX_VERSION: u32 = 1;

/// How results are selected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Top-k by cosine similarity
    Similarity,
    /// MMR over the `fetch_k` most similar chunks
    Diversity { fetch_k: usize, lambda: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Chunks of one document with their embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    embed_model: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Pair chunks with their vectors; order is preserved
    pub fn build(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        embed_model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::embedding(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            version: INDEX_VERSION,
            embed_model: embed_model.into(),
            dimensions,
            created_at: Utc::now(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Chunks in insertion order
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Whether `dir` holds an index file
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Write `index.json` into `dir`, replacing any previous file atomically
    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(INDEX_FILE)).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            dir = %dir.display(),
            entries = self.entries.len(),
            "Persisted vector index"
        );
        Ok(())
    }

    /// Load the index stored in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexNotFound(dir.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let index: VectorIndex = serde_json::from_slice(&raw).map_err(|e| {
            tracing::warn!(path = %path.display(), "Unreadable index file: {}", e);
            Error::IndexNotFound(dir.display().to_string())
        })?;

        if index.version != INDEX_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = index.version,
                "Unsupported index version"
            );
            return Err(Error::IndexNotFound(dir.display().to_string()));
        }
        if index.entries.iter().any(|e| e.vector.len() != index.dimensions) {
            tracing::warn!(path = %path.display(), "Index entries disagree with recorded dimensions");
            return Err(Error::IndexNotFound(dir.display().to_string()));
        }

        Ok(index)
    }

    /// Return at most `k` chunks with their relevance scores.
    ///
    /// Equal scores keep insertion order. An empty index yields no results.
    pub fn search(&self, query: &[f32], k: usize, mode: SearchMode) -> Result<Vec<(Chunk, f32)>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // Stable sort: ties stay in insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let selected = match mode {
            SearchMode::Similarity => {
                scored.truncate(k);
                scored
            }
            SearchMode::Diversity { fetch_k, lambda } => {
                scored.truncate(fetch_k.max(k));
                let candidates = scored
                    .into_iter()
                    .map(|(index, score)| MmrCandidate {
                        index,
                        score,
                        vector: &self.entries[index].vector,
                    })
                    .collect();
                mmr_rerank(candidates, k, lambda)
            }
        };

        Ok(selected
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect())
    }
}
