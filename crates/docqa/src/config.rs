//! Configuration for the document QA system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocQaConfig {
    /// On-disk layout and retention
    pub storage: StorageConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Retrieval and context assembly
    pub retrieval: RetrievalConfig,
    /// Conversation memory bounds
    pub memory: MemoryConfig,
    /// Query sanitization and answer redaction
    pub guard: GuardConfig,
}

impl DocQaConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config: DocQaConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCQA_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DOCQA_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Ok(dir) = std::env::var("DOCQA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("DOCQA_GENERATE_MODEL") {
            self.llm.generate_model = model;
        }
    }

    /// Check that the parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }

        let r = &self.retrieval;
        if r.k == 0 {
            return Err(Error::Config("retrieval.k must be greater than zero".to_string()));
        }
        if r.fetch_k < r.k {
            return Err(Error::Config(format!(
                "retrieval.fetch_k ({}) must be at least k ({})",
                r.fetch_k, r.k
            )));
        }
        if !(0.0..=1.0).contains(&r.lambda) {
            return Err(Error::Config(format!(
                "retrieval.lambda ({}) must be within 0.0..=1.0",
                r.lambda
            )));
        }
        if r.context_budget == 0 {
            return Err(Error::Config("retrieval.context_budget must be greater than zero".to_string()));
        }
        if r.context_budget < c.chunk_size {
            return Err(Error::Config(format!(
                "retrieval.context_budget ({}) must hold at least one chunk ({})",
                r.context_budget, c.chunk_size
            )));
        }

        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be greater than zero".to_string()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be greater than zero".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be greater than zero".to_string()));
        }

        Ok(())
    }
}

/// Storage layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `uploads/` and `vectorstore/`
    pub data_dir: PathBuf,
    /// Age after which uploads and indexes may be deleted (default: 30 minutes)
    pub ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docqa");

        Self {
            data_dir,
            ttl_secs: 30 * 60,
        }
    }
}

impl StorageConfig {
    /// Directory holding one sub-directory per uploaded document
    pub fn upload_root(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory holding one index directory per document
    pub fn vector_root(&self) -> PathBuf {
        self.data_dir.join("vectorstore")
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Which embedder backs ingestion and retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embed`
    #[default]
    Ollama,
    /// Deterministic local feature hashing, no network
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend selection
    pub backend: EmbeddingBackend,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Texts per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            dimensions: 768,
            batch_size: 32,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Transport-level retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3".to_string(),
            temperature: 0.1,
            timeout_secs: 60,
            max_retries: 1,
        }
    }
}

/// Retrieval and context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned to the answerer
    pub k: usize,
    /// Candidate pool for diversity re-ranking
    pub fetch_k: usize,
    /// MMR balance: 1.0 = pure relevance, 0.0 = pure diversity
    pub lambda: f32,
    /// Maximum context characters passed to the model
    pub context_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            fetch_k: 10,
            lambda: 0.5,
            context_budget: 3000,
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns kept per document
    pub max_turns: usize,
    /// Question plus answer characters kept per document
    pub max_chars: usize,
    /// Whether prior turns are added to the prompt
    pub include_in_prompt: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_chars: 4000,
            include_in_prompt: true,
        }
    }
}

/// Guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Case-insensitive substrings that make a query unsafe
    pub forbidden_words: Vec<String>,
    /// Additional regex patterns scrubbed from answers
    pub extra_redaction_patterns: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            forbidden_words: ["password", "secret", "token", "apikey"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            extra_redaction_patterns: Vec::new(),
        }
    }
}
