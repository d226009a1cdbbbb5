//! Error types for the document QA system

use thiserror::Error;

/// Result type alias for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Canned message shown when a document has not been indexed yet
pub const MSG_NOT_INDEXED: &str = "This document has not been indexed yet. Please upload it first.";

/// Canned message shown for unsupported uploads
pub const MSG_UNSUPPORTED: &str = "This file type is not supported. Please upload a PDF, DOCX or text file.";

/// Canned message shown when an upstream service fails or times out
pub const MSG_TRY_AGAIN: &str = "The assistant is temporarily unavailable. Please try again.";

/// Canned message shown for rejected queries
pub const MSG_UNSAFE_QUERY: &str = "This question cannot be answered because it asks for sensitive information.";

/// Canned message shown when an index no longer matches the embedding model
pub const MSG_REINDEX: &str =
    "This document was indexed with a different embedding model. Please upload it again.";

/// Canned message for everything else
pub const MSG_INTERNAL: &str = "Something went wrong while processing your request.";

/// docqa errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File type is not recognised or its content is not text
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// No valid index at the requested location
    #[error("Index not found at {0}")]
    IndexNotFound(String),

    /// Embedding service returned something unusable
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Query vector does not match the index
    #[error("Embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Index was built by another embedder than the one answering
    #[error("Index was embedded with '{index}', query embedder is '{query}'")]
    EmbedderMismatch { index: String, query: String },

    /// Embedding or language model service did not answer in time
    #[error("Upstream service timed out after {0}s")]
    UpstreamTimeout(u64),

    /// Embedding or language model service is unreachable or failing
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Upstream service answered, but with a client error or an unusable body
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a caller may retry the operation after a backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::UpstreamTimeout(_) | Error::Upstream(_) => true,
            Error::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }

    /// Stable message safe to show to an end user.
    ///
    /// Never includes upstream error text or internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) | Error::FileParse { .. } => MSG_UNSUPPORTED,
            Error::IndexNotFound(_) => MSG_NOT_INDEXED,
            Error::EmbedderMismatch { .. } => MSG_REINDEX,
            Error::UpstreamTimeout(_)
            | Error::Upstream(_)
            | Error::InvalidResponse(_)
            | Error::Http(_)
            | Error::Embedding(_) => MSG_TRY_AGAIN,
            Error::Config(_)
            | Error::DimensionMismatch { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => MSG_INTERNAL,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {}", err))
    }
}
