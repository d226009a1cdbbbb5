//! Embedding and language model providers

pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
