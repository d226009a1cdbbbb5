//! Content-addressed cache of built indexes

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::path::PathBuf;

use crate::retrieval::VectorIndex;

/// Where the index for a given file content lives
#[derive(Debug, Clone, PartialEq)]
pub struct CachedIndex {
    pub doc_id: String,
    pub persist_dir: PathBuf,
    pub ingested_at: DateTime<Utc>,
}

/// Maps the SHA-256 of uploaded bytes to an existing index, so identical
/// uploads skip re-embedding while the index is younger than the TTL.
pub struct IndexCache {
    entries: DashMap<String, CachedIndex>,
    ttl: Duration,
}

impl IndexCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)),
        }
    }

    fn is_fresh(&self, entry: &CachedIndex) -> bool {
        Utc::now() - entry.ingested_at < self.ttl && VectorIndex::exists(&entry.persist_dir)
    }

    /// Live entry for `content_hash`; stale entries are dropped
    pub fn lookup(&self, content_hash: &str) -> Option<CachedIndex> {
        let entry = self.entries.get(content_hash)?.clone();
        if self.is_fresh(&entry) {
            return Some(entry);
        }

        tracing::debug!(doc_id = %entry.doc_id, "Dropping stale cache entry");
        self.entries.remove(content_hash);
        None
    }

    pub fn insert(&self, content_hash: impl Into<String>, entry: CachedIndex) {
        self.entries.insert(content_hash.into(), entry);
    }

    /// Forget every entry pointing at `doc_id`
    pub fn invalidate(&self, doc_id: &str) {
        self.entries.retain(|_, e| e.doc_id != doc_id);
    }

    /// Drop expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| Utc::now() - e.ingested_at < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
