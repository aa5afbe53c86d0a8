//! Test utilities for recollect - mock capability gateway
//!
//! `MockGateway` gives fast, deterministic answers for every capability so
//! store, server and CLI tests never need a model or network access.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::CapabilityGateway;
use crate::gateway::types::{GatewayError, Result, Validation};

/// Default embedding dimension of the mock
pub const MOCK_DIMENSION: usize = 64;

/// Mock gateway for tests.
///
/// Embeddings are hashed bag-of-words vectors: texts sharing words have
/// positive cosine similarity, and the same text always gets the same
/// vector. Specific texts can be pinned to explicit vectors.
#[derive(Debug)]
pub struct MockGateway {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    categories: Vec<String>,
    validation: Validation,
    insights: Vec<String>,
    latency: Option<Duration>,
    failing: AtomicBool,
    embed_calls: AtomicUsize,
    categorize_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    reflect_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(MOCK_DIMENSION)
    }
}

impl MockGateway {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            overrides: Mutex::new(HashMap::new()),
            categories: vec!["general".to_string()],
            validation: Validation::new(true, 0.9, "Consistent with context"),
            insights: vec!["No notable patterns".to_string()],
            latency: None,
            failing: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
            categorize_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            reflect_calls: AtomicUsize::new(0),
        }
    }

    /// Pin `text` to an explicit embedding
    pub fn with_embedding(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.set_embedding(text, vector);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_insights(mut self, insights: Vec<String>) -> Self {
        self.insights = insights;
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call fail until reset
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_embedding(&self, text: impl Into<String>, vector: Vec<f32>) {
        if let Ok(mut overrides) = self.overrides.lock() {
            overrides.insert(text.into(), vector);
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The embedding `embed` returns for `text`, without counting a call
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self
            .overrides
            .lock()
            .ok()
            .and_then(|overrides| overrides.get(text).cloned())
        {
            return vector;
        }

        let mut vector = vec![0.0; self.dimension];
        let mut any = false;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
            any = true;
        }
        if !any {
            vector[0] = 1.0;
        }
        vector
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn categorize_calls(&self) -> usize {
        self.categorize_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn reflect_calls(&self) -> usize {
        self.reflect_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, counter: &AtomicUsize, capability: &str) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Api(format!("mock {capability} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityGateway for MockGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.enter(&self.embed_calls, "embedding").await?;
        Ok(self.embedding_for(text))
    }

    async fn categorize(&self, _content: &str) -> Result<Vec<String>> {
        self.enter(&self.categorize_calls, "categorization").await?;
        Ok(self.categories.clone())
    }

    async fn validate(&self, _content: &str, _context: Option<&str>) -> Result<Validation> {
        self.enter(&self.validate_calls, "validation").await?;
        Ok(self.validation.clone())
    }

    async fn reflect(&self, _memories: &[String], _context: Option<&str>) -> Result<Vec<String>> {
        self.enter(&self.reflect_calls, "reflection").await?;
        Ok(self.insights.clone())
    }

    async fn is_available(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
