//! Per-document reader-writer locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// One async reader-writer lock per `doc_id`.
///
/// Ingestion holds the write side for the whole build and swap; answers
/// hold the read side, so they never observe a half-replaced index.
#[derive(Debug, Default)]
pub struct DocLocks {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl DocLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, doc_id: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Shared access for queries
    pub async fn read(&self, doc_id: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(doc_id).read_owned().await
    }

    /// Exclusive access for ingestion
    pub async fn write(&self, doc_id: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(doc_id).write_owned().await
    }

    /// Exclusive access if nobody holds the document right now
    pub fn try_write(&self, doc_id: &str) -> Option<OwnedRwLockWriteGuard<()>> {
        self.lock_for(doc_id).try_write_owned().ok()
    }

    /// Drop the lock for a deleted document.
    ///
    /// A lock that is held or awaited stays registered, so later callers
    /// still queue behind the current holder.
    pub fn remove(&self, doc_id: &str) -> bool {
        self.locks
            .remove_if(doc_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
