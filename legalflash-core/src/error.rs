//! Error types for the LegalFlash service.
//!
//! This module provides context-aware error types covering every stage of
//! the retrieval pipeline, from knowledge-base loading to response
//! generation.

use thiserror::Error;

/// Core error type for the LegalFlash service.
///
/// This enum covers all error conditions that can occur while loading
/// knowledge bases, rewriting queries, retrieving and reranking passages,
/// and generating answers.
#[derive(Error, Debug)]
pub enum LegalFlashError {
    /// I/O related errors (file reading, network operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding generation errors
    #[error("Embedding error: {message}")]
    Embedding {
        /// Detailed error message
        message: String,
    },

    /// Knowledge-base (vector store) operation errors
    #[error("Knowledge base error: {message}")]
    KnowledgeBase {
        /// Detailed error message
        message: String,
    },

    /// Inference backend errors (completion endpoint failures)
    #[error("Inference error: {message}")]
    Inference {
        /// Detailed error message
        message: String,
    },

    /// Reranking model errors
    #[error("Rerank error: {message}")]
    Rerank {
        /// Detailed error message
        message: String,
    },

    /// Pipeline execution errors
    #[error("Pipeline error: {message}")]
    Pipeline {
        /// Detailed error message
        message: String,
    },

    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {message}")]
    Validation {
        /// Detailed error message
        message: String,
    },

    /// Resource not found errors
    #[error("Not found: {resource}")]
    NotFound {
        /// Name of the missing resource
        resource: String,
    },

    /// Operation timeout errors
    #[error("Timeout: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },

    /// Generic errors from external dependencies
    #[error("External error: {source}")]
    External {
        /// The underlying error
        #[source]
        source: anyhow::Error,
    },
}

impl LegalFlashError {
    /// Create a new embedding error with a message.
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a new knowledge-base error with a message.
    pub fn knowledge_base<S: Into<String>>(message: S) -> Self {
        Self::KnowledgeBase {
            message: message.into(),
        }
    }

    /// Create a new inference error with a message.
    pub fn inference<S: Into<String>>(message: S) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Create a new rerank error with a message.
    pub fn rerank<S: Into<String>>(message: S) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    /// Create a new pipeline error with a message.
    pub fn pipeline<S: Into<String>>(message: S) -> Self {
        Self::Pipeline {
            message: message.into(),
        }
    }

    /// Create a new configuration error with a message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new validation error with a message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not found error with a resource name.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new timeout error with an operation name.
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new internal error with a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new external error from any error that implements `Into<anyhow::Error>`.
    pub fn external<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::External {
            source: error.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Returns `true` for transient errors that might succeed on retry,
    /// such as inference-backend connection failures or timeouts.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Inference { .. } | Self::Io(_)
        )
    }

    /// Check if this error is a client error (4xx-style).
    ///
    /// Returns `true` for errors caused by invalid input or configuration
    /// that won't be fixed by retrying.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Configuration { .. } | Self::NotFound { .. }
        )
    }
}

/// Convert from `anyhow::Error` to `LegalFlashError`.
impl From<anyhow::Error> for LegalFlashError {
    fn from(error: anyhow::Error) -> Self {
        Self::External { source: error }
    }
}

/// Result type alias for convenience.
///
/// This is the standard result type used throughout the LegalFlash service.
pub type Result<T> = std::result::Result<T, LegalFlashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LegalFlashError::embedding("Failed to embed query");
        assert!(matches!(err, LegalFlashError::Embedding { .. }));
        assert_eq!(err.to_string(), "Embedding error: Failed to embed query");
    }

    #[test]
    fn test_error_retryable() {
        assert!(LegalFlashError::timeout("completion").is_retryable());
        assert!(LegalFlashError::inference("connection refused").is_retryable());
        assert!(!LegalFlashError::validation("invalid input").is_retryable());
    }

    #[test]
    fn test_error_client_error() {
        assert!(LegalFlashError::validation("invalid").is_client_error());
        assert!(LegalFlashError::not_found("chroma_db").is_client_error());
        assert!(!LegalFlashError::timeout("completion").is_client_error());
    }
}
