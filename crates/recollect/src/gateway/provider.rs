//! Capability gateway trait
//!
//! The engine reaches every model-backed capability (embedding,
//! categorization, validation, reflection) through this trait and never
//! depends on a specific provider.

use async_trait::async_trait;

use crate::gateway::types::{Result, Validation};

/// Trait for capability providers (remote API, local model, hybrid)
#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    /// Compute an embedding for `text`
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Suggest semantic categories for a memory's content
    async fn categorize(&self, content: &str) -> Result<Vec<String>>;

    /// Judge whether `content` still holds, optionally against `context`
    async fn validate(&self, content: &str, context: Option<&str>) -> Result<Validation>;

    /// Derive insights from a set of memories
    async fn reflect(&self, memories: &[String], context: Option<&str>) -> Result<Vec<String>>;

    /// Check if the provider can serve requests (model loaded, API key present, etc.)
    async fn is_available(&self) -> bool;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
