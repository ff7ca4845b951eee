use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{service} request failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to process document '{document}': {message}")]
    DocumentProcessing { document: String, message: String },

    #[error("Retrieval failed: {message}")]
    Retrieval {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn external(service: impl Into<String>, err: impl Display) -> Self {
        Self::ExternalService { service: service.into(), message: err.to_string() }
    }

    pub fn document(document: impl Into<String>, err: impl Display) -> Self {
        Self::DocumentProcessing { document: document.into(), message: err.to_string() }
    }

    pub fn retrieval(message: impl Into<String>, source: Error) -> Self {
        Self::Retrieval { message: message.into(), source: Box::new(source) }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { .. } => true,
            Self::Retrieval { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
