//! Local embeddings using fastembed
//!
//! Runs an ONNX sentence-embedding model on the CPU. Only embedding is
//! served locally; the chat-backed capabilities report `Unsupported` and
//! are expected to be routed elsewhere by a [`HybridGateway`](super::HybridGateway).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::config::LocalGatewayConfig;
use crate::gateway::CapabilityGateway;
use crate::gateway::types::{GatewayError, Result, Validation};

pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

fn parse_model(name: &str) -> Result<EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(GatewayError::Config(format!(
            "Unknown local embedding model '{other}'"
        ))),
    }
}

impl LocalEmbedder {
    /// Load the configured model, downloading it on first use
    pub fn new(config: &LocalGatewayConfig) -> Result<Self> {
        let model = parse_model(&config.model)?;
        info!("Loading local embedding model: {}", config.model);

        let embedding = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: config.model.clone(),
        })
    }

    fn unsupported<T>(capability: &str) -> Result<T> {
        Err(GatewayError::Unsupported(format!(
            "local embedder does not provide {capability}"
        )))
    }
}

#[async_trait]
impl CapabilityGateway for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| GatewayError::Unavailable("embedding model poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| GatewayError::Api(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| GatewayError::Api("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| GatewayError::Api(format!("Embedding task failed: {e}")))?
    }

    async fn categorize(&self, _content: &str) -> Result<Vec<String>> {
        Self::unsupported("categorization")
    }

    async fn validate(&self, _content: &str, _context: Option<&str>) -> Result<Validation> {
        Self::unsupported("validation")
    }

    async fn reflect(&self, _memories: &[String], _context: Option<&str>) -> Result<Vec<String>> {
        Self::unsupported("reflection")
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model() {
        assert!(matches!(
            parse_model("Multilingual-E5-Small"),
            Ok(EmbeddingModel::MultilingualE5Small)
        ));
        assert!(parse_model("gpt-2").is_err());
    }
}
