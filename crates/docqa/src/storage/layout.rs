//! Where uploads and indexes live

use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::Result;

/// Hex characters of the content hash appended to the document id
const HASH_PREFIX_LEN: usize = 8;

/// Stable document id: sanitized lowercase file stem plus a content hash prefix.
///
/// Two different files with the same name get different ids; the same file
/// uploaded twice gets the same id.
pub fn doc_id_for(filename: &str, content_hash: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut id: String = stem
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        id.push_str("document");
    }

    let prefix: String = content_hash.chars().take(HASH_PREFIX_LEN).collect();
    format!("{}_{}", id, prefix)
}

/// Directory layout under the configured data directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_root: PathBuf,
    vector_root: PathBuf,
}

impl StorageLayout {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            upload_root: config.upload_root(),
            vector_root: config.vector_root(),
        }
    }

    /// Create both roots if missing
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_root)?;
        std::fs::create_dir_all(&self.vector_root)?;
        Ok(())
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn vector_root(&self) -> &Path {
        &self.vector_root
    }

    /// `<data_dir>/uploads/<doc_id>`
    pub fn upload_dir(&self, doc_id: &str) -> PathBuf {
        self.upload_root.join(doc_id)
    }

    /// `<data_dir>/vectorstore/<doc_id>`
    pub fn index_dir(&self, doc_id: &str) -> PathBuf {
        self.vector_root.join(doc_id)
    }

    /// Both roots, as swept by the expiry cleanup
    pub fn roots(&self) -> Vec<PathBuf> {
        vec![self.upload_root.clone(), self.vector_root.clone()]
    }
}
