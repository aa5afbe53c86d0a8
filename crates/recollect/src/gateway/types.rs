//! Capability gateway types
//!
//! Results returned by the gateway and the gateway-specific error type.
//! Gateway errors never cross the engine boundary raw; the store wraps them
//! into [`RecollectError::Storage`](crate::error::RecollectError::Storage).

use serde::{Deserialize, Serialize};

use crate::error::RecollectError;

/// Outcome of asking the gateway whether a memory still holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_update: Option<String>,
}

impl Validation {
    pub fn new(is_valid: bool, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            is_valid,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            suggested_update: None,
        }
    }

    pub fn with_suggested_update(mut self, update: impl Into<String>) -> Self {
        self.suggested_update = Some(update.into());
        self
    }
}

/// Gateway-specific errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unsupported capability: {0}")]
    Unsupported(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Wrap into the engine taxonomy, naming the capability that failed
    pub fn into_storage(self, capability: &str) -> RecollectError {
        RecollectError::Storage(format!("{capability} failed: {self}"))
    }
}
