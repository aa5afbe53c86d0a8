//! Remote capability gateway using OpenAI-compatible APIs
//!
//! Embeddings come from `/embeddings`; categorization, validation and
//! reflection are chat completions whose answers are parsed as JSON.
//! The API key is read from the environment variable named in config.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteGatewayConfig;
use crate::gateway::CapabilityGateway;
use crate::gateway::prompts::{categorize_prompt, reflect_prompt, validate_prompt};
use crate::gateway::types::{GatewayError, Result, Validation};

const MAX_RETRIES: u32 = 3;

/// Remote gateway using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteGateway {
    client: Client,
    config: RemoteGatewayConfig,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteGateway {
    /// Create a new remote gateway.
    ///
    /// Fails if the API key environment variable is not set or `api_url`
    /// is not an absolute URL.
    pub fn new(config: &RemoteGatewayConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_url).map_err(|e| {
            GatewayError::Config(format!("Invalid api_url '{}': {e}", config.api_url))
        })?;
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            GatewayError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Api(e.to_string()))?;

        info!(
            "RemoteGateway initialized with embedding model: {}, chat model: {}, api_url: {}",
            config.embedding_model, config.chat_model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            base_url,
            api_key,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// POST a JSON body, retrying with exponential backoff (1s, 2s, 4s) on
    /// rate limiting and transport errors
    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(endpoint);
        debug!("Calling remote API at: {}", url);

        let mut last_error = None;
        let mut delay = Duration::from_secs(1);

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(format!("API returned {status}"));
                        if attempt < MAX_RETRIES - 1 {
                            warn!(
                                "Rate limited on attempt {}/{}, waiting {:?}",
                                attempt + 1,
                                MAX_RETRIES,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                        }
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(GatewayError::Api(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    return response
                        .json()
                        .await
                        .map_err(|e| GatewayError::Parse(e.to_string()));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(GatewayError::Api(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages: vec![
                Message {
                    role: "system",
                    content: "You maintain long-term memories about a user. Answer only with JSON.",
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 1024,
        };

        let completion: ChatCompletionResponse = self.post("chat/completions", &request).await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Api("Empty response".to_string()))
    }

    async fn chat_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let response = self.chat(prompt).await?;
        debug!("Chat response: {}", response);
        serde_json::from_str(json_payload(&response))
            .map_err(|e| GatewayError::Parse(format!("Failed to parse JSON answer: {e}")))
    }
}

/// Strip a Markdown code fence around a JSON answer, if present
fn json_payload(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[async_trait]
impl CapabilityGateway for RemoteGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: vec![text],
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GatewayError::Api("No embedding returned".to_string()))
    }

    async fn categorize(&self, content: &str) -> Result<Vec<String>> {
        let categories: Vec<String> = self.chat_json(&categorize_prompt(content)).await?;
        Ok(categories
            .into_iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn validate(&self, content: &str, context: Option<&str>) -> Result<Validation> {
        let validation: Validation = self.chat_json(&validate_prompt(content, context)).await?;
        Ok(Validation {
            confidence: validation.confidence.clamp(0.0, 1.0),
            ..validation
        })
    }

    async fn reflect(&self, memories: &[String], context: Option<&str>) -> Result<Vec<String>> {
        if memories.is_empty() {
            return Ok(Vec::new());
        }
        self.chat_json(&reflect_prompt(memories, context)).await
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty() && !self.config.api_url.is_empty()
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_ENV: &str = "RECOLLECT_TEST_API_KEY";

    fn create_test_config(api_url: String) -> RemoteGatewayConfig {
        RemoteGatewayConfig {
            api_url,
            api_key_env: KEY_ENV.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }

    fn gateway(api_url: String) -> RemoteGateway {
        unsafe { env::set_var(KEY_ENV, "test-key") };
        RemoteGateway::new(&create_test_config(api_url)).unwrap()
    }

    fn chat_answer(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": { "content": content }
            }]
        })
    }

    async fn mount_chat(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer(content)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_new_missing_api_key() {
        let mut config = create_test_config("https://api.example.com/v1".to_string());
        config.api_key_env = "RECOLLECT_TEST_UNSET_KEY".to_string();
        unsafe { env::remove_var("RECOLLECT_TEST_UNSET_KEY") };

        let err = RemoteGateway::new(&config).unwrap_err().to_string();
        assert!(err.contains("RECOLLECT_TEST_UNSET_KEY"));
    }

    #[tokio::test]
    async fn test_embed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["User is vegetarian"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&mock_server)
            .await;

        let gateway = gateway(mock_server.uri());
        let embedding = gateway.embed("User is vegetarian").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_empty_response_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&mock_server)
            .await;

        let gateway = gateway(mock_server.uri());
        assert!(gateway.embed("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_categorize_normalizes_tags() {
        let mock_server = MockServer::start().await;
        mount_chat(&mock_server, r#"["Diet", " preferences ", ""]"#).await;

        let gateway = gateway(mock_server.uri());
        let categories = gateway.categorize("User is vegetarian").await.unwrap();
        assert_eq!(categories, vec!["diet", "preferences"]);
    }

    #[tokio::test]
    async fn test_validate_parses_fenced_json() {
        let mock_server = MockServer::start().await;
        mount_chat(
            &mock_server,
            "```json\n{\"is_valid\": false, \"confidence\": 0.8, \"reason\": \"User went vegan\", \"suggested_update\": \"User is vegan\"}\n```",
        )
        .await;

        let gateway = gateway(mock_server.uri());
        let validation = gateway
            .validate("User is vegetarian", Some("I stopped eating dairy"))
            .await
            .unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.suggested_update.as_deref(), Some("User is vegan"));
    }

    #[tokio::test]
    async fn test_reflect() {
        let mock_server = MockServer::start().await;
        mount_chat(&mock_server, r#"["User prefers plant-based meals"]"#).await;

        let gateway = gateway(mock_server.uri());
        let insights = gateway
            .reflect(
                &["User is vegetarian".to_string(), "User likes tofu".to_string()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(insights, vec!["User prefers plant-based meals"]);
    }

    #[tokio::test]
    async fn test_reflect_without_memories_skips_request() {
        let mock_server = MockServer::start().await;
        let gateway = gateway(mock_server.uri());

        assert!(gateway.reflect(&[], None).await.unwrap().is_empty());
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        mount_chat(&mock_server, r#"["diet"]"#).await;

        let gateway = gateway(mock_server.uri());

        let start = std::time::Instant::now();
        let result = gateway.categorize("User is vegetarian").await;
        let elapsed = start.elapsed();

        assert_eq!(result.unwrap(), vec!["diet"]);
        assert!(elapsed >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_without_final_wait() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        let gateway = gateway(mock_server.uri());

        let start = std::time::Instant::now();
        let err = gateway.categorize("User is vegetarian").await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.to_string().contains("429"));
        // Waits 1s and 2s between the three attempts, nothing after the last
        assert!(elapsed >= Duration::from_millis(2900));
        assert!(elapsed < Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let gateway = gateway(mock_server.uri());
        let err = gateway.embed("Test").await.unwrap_err().to_string();
        assert!(err.contains("500"));
    }

    #[tokio::test]
    async fn test_invalid_json_answer() {
        let mock_server = MockServer::start().await;
        mount_chat(&mock_server, "not valid json").await;

        let gateway = gateway(mock_server.uri());
        let err = gateway.categorize("Test").await.unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    #[tokio::test]
    async fn test_is_available_and_name() {
        let gateway = gateway("https://api.example.com/v1".to_string());
        assert!(gateway.is_available().await);
        assert_eq!(gateway.name(), "remote");
    }

    #[test]
    fn test_json_payload() {
        assert_eq!(json_payload("  [1, 2] "), "[1, 2]");
        assert_eq!(json_payload("```json\n[1]\n```"), "[1]");
        assert_eq!(json_payload("```\n{}\n```"), "{}");
    }
}
