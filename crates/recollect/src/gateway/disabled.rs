//! Gateway that serves nothing
//!
//! For stores that only ever receive explicit vectors, and for operator
//! commands that never need a model.

use async_trait::async_trait;

use crate::gateway::CapabilityGateway;
use crate::gateway::types::{GatewayError, Result, Validation};

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGateway;

impl DisabledGateway {
    pub fn new() -> Self {
        Self
    }

    fn unavailable<T>(capability: &str) -> Result<T> {
        Err(GatewayError::Unavailable(format!(
            "no capability provider configured for {capability}"
        )))
    }
}

#[async_trait]
impl CapabilityGateway for DisabledGateway {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Self::unavailable("embedding")
    }

    async fn categorize(&self, _content: &str) -> Result<Vec<String>> {
        Self::unavailable("categorization")
    }

    async fn validate(&self, _content: &str, _context: Option<&str>) -> Result<Validation> {
        Self::unavailable("validation")
    }

    async fn reflect(&self, _memories: &[String], _context: Option<&str>) -> Result<Vec<String>> {
        Self::unavailable("reflection")
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_capability_fails() {
        let gateway = DisabledGateway::new();

        assert!(matches!(
            gateway.embed("text").await,
            Err(GatewayError::Unavailable(_))
        ));
        assert!(gateway.categorize("text").await.is_err());
        assert!(gateway.validate("text", None).await.is_err());
        assert!(gateway.reflect(&[], None).await.is_err());
        assert!(!gateway.is_available().await);
        assert_eq!(gateway.name(), "disabled");
    }
}
