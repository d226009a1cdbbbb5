//! Expiry sweep for uploads and indexes

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Outcome of a sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries deleted
    pub removed: Vec<PathBuf>,
    /// Entries that were expired but could not be deleted
    pub failed: usize,
    /// Expired entries left alone because they were in use
    pub skipped: usize,
}

/// Delete top-level entries of each root whose mtime is older than `ttl`.
///
/// Missing roots are skipped. Failures on individual entries are logged and
/// counted, never fatal.
pub fn cleanup_expired(roots: &[PathBuf], ttl: Duration) -> CleanupReport {
    cleanup_expired_where(roots, ttl, |_| true)
}

/// Like [`cleanup_expired`], but only deletes expired entries for which
/// `may_remove` returns `true`. The others are counted as skipped.
pub fn cleanup_expired_where<F>(roots: &[PathBuf], ttl: Duration, mut may_remove: F) -> CleanupReport
where
    F: FnMut(&Path) -> bool,
{
    let now = SystemTime::now();
    let mut report = CleanupReport::default();

    for root in roots {
        if !root.exists() {
            continue;
        }

        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(root = %root.display(), "Failed to list entry: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let age = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|mtime| now.duration_since(mtime).ok());
            let Some(age) = age else { continue };
            if age <= ttl {
                continue;
            }
            if !may_remove(entry.path()) {
                report.skipped += 1;
                continue;
            }

            match remove_entry(entry.path(), entry.file_type().is_dir()) {
                Ok(()) => {
                    tracing::info!(path = %entry.path().display(), age_secs = age.as_secs(), "Removed expired entry");
                    report.removed.push(entry.into_path());
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), "Failed to remove expired entry: {}", e);
                    report.failed += 1;
                }
            }
        }
    }

    report
}

fn remove_entry(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
