//! Error types for Cognate

use thiserror::Error;

use crate::types::MemoryKind;

/// Result type alias for Cognate operations
pub type Result<T> = std::result::Result<T, CognateError>;

/// Main error type for Cognate
#[derive(Error, Debug)]
pub enum CognateError {
    /// No items of the requested kind exist in the store. Recoverable:
    /// the correction loop proceeds with empty evidence.
    #[error("Memory store has no items of kind {0:?}")]
    EmptyStore(Option<MemoryKind>),

    /// Embedding backend failure. Fatal for the query that hit it.
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit sink error: {0}")]
    Sink(String),

    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("Session {0} is closed")]
    SessionClosed(String),

    #[error("Query cancelled between stages")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CognateError {
    /// Whether the correction loop may continue after this error.
    /// Only an empty store is recoverable in-loop; everything else
    /// fails the query.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CognateError::EmptyStore(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_is_recoverable() {
        assert!(CognateError::EmptyStore(None).is_recoverable());
        assert!(CognateError::EmptyStore(Some(MemoryKind::Knowledge)).is_recoverable());
    }

    #[test]
    fn test_embedding_failure_is_fatal() {
        assert!(!CognateError::Embedding("backend down".into()).is_recoverable());
        assert!(!CognateError::RetryBudgetExhausted { attempts: 4 }.is_recoverable());
    }
}
