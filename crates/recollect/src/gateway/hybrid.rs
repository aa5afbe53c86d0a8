//! Hybrid gateway with per-capability routing and fallback
//!
//! Embeddings go to the embedder first and fall back to the reasoner;
//! categorization, validation and reflection go the other way round.
//! If both fail, the error from the fallback is returned.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::gateway::CapabilityGateway;
use crate::gateway::types::{Result, Validation};

pub struct HybridGateway {
    embedder: Arc<dyn CapabilityGateway>,
    reasoner: Arc<dyn CapabilityGateway>,
}

impl HybridGateway {
    pub fn new(embedder: Arc<dyn CapabilityGateway>, reasoner: Arc<dyn CapabilityGateway>) -> Self {
        Self { embedder, reasoner }
    }
}

async fn with_fallback<'a, T, F, Fut>(
    capability: &str,
    primary: &'a dyn CapabilityGateway,
    fallback: &'a dyn CapabilityGateway,
    call: F,
) -> Result<T>
where
    F: Fn(&'a dyn CapabilityGateway) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call(primary).await {
        Ok(result) => {
            debug!("{} served by {} gateway", capability, primary.name());
            Ok(result)
        }
        Err(e) => {
            warn!(
                "{} gateway failed {}: {}, trying {}",
                primary.name(),
                capability,
                e,
                fallback.name()
            );
            call(fallback).await.inspect_err(|e| {
                warn!("{} gateway also failed {}: {}", fallback.name(), capability, e);
            })
        }
    }
}

#[async_trait]
impl CapabilityGateway for HybridGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_fallback("embedding", &*self.embedder, &*self.reasoner, |g| {
            g.embed(text)
        })
        .await
    }

    async fn categorize(&self, content: &str) -> Result<Vec<String>> {
        with_fallback("categorization", &*self.reasoner, &*self.embedder, |g| {
            g.categorize(content)
        })
        .await
    }

    async fn validate(&self, content: &str, context: Option<&str>) -> Result<Validation> {
        with_fallback("validation", &*self.reasoner, &*self.embedder, |g| {
            g.validate(content, context)
        })
        .await
    }

    async fn reflect(&self, memories: &[String], context: Option<&str>) -> Result<Vec<String>> {
        with_fallback("reflection", &*self.reasoner, &*self.embedder, |g| {
            g.reflect(memories, context)
        })
        .await
    }

    async fn is_available(&self) -> bool {
        self.embedder.is_available().await || self.reasoner.is_available().await
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::DisabledGateway;
    use crate::testing::MockGateway;

    #[tokio::test]
    async fn test_embed_prefers_embedder() {
        let embedder = Arc::new(MockGateway::new(8));
        let reasoner = Arc::new(MockGateway::new(8));
        let hybrid = HybridGateway::new(embedder.clone(), reasoner.clone());

        hybrid.embed("hello").await.unwrap();
        assert_eq!(embedder.embed_calls(), 1);
        assert_eq!(reasoner.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_failure() {
        let reasoner = Arc::new(MockGateway::new(8).with_categories(vec!["diet".to_string()]));
        let hybrid = HybridGateway::new(Arc::new(DisabledGateway::new()), reasoner.clone());

        assert_eq!(hybrid.embed("hello").await.unwrap().len(), 8);
        assert_eq!(hybrid.categorize("hello").await.unwrap(), vec!["diet"]);
        assert_eq!(reasoner.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_returns_error() {
        let hybrid = HybridGateway::new(
            Arc::new(DisabledGateway::new()),
            Arc::new(DisabledGateway::new()),
        );
        assert!(hybrid.validate("x", None).await.is_err());
        assert!(!hybrid.is_available().await);
        assert_eq!(hybrid.name(), "hybrid");
    }
}
