//! Error types for Recollect

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Recollect operations
#[derive(Error, Debug)]
pub enum RecollectError {
    /// A referenced memory is absent, or excluded by the archival/expiry filter
    #[error("Memory not found: {0}")]
    NotFound(String),

    /// A bulk operation was called without a usable target
    #[error("Invalid memory filter: {0}")]
    InvalidFilter(String),

    /// Persistence, indexing, or capability gateway failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecollectError {
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_invalid_filter(&self) -> bool {
        matches!(self, Self::InvalidFilter(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for Recollect operations
pub type Result<T> = std::result::Result<T, RecollectError>;
