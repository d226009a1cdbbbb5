//! On-disk layout, content cache and expiry sweep

pub mod cache;
pub mod cleanup;
pub mod layout;

pub use cache::{CachedIndex, IndexCache};
pub use cleanup::{cleanup_expired, cleanup_expired_where, CleanupReport};
pub use layout::{doc_id_for, StorageLayout};
