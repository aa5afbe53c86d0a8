use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RecollectError, Result};

/// Main configuration structure for Recollect
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Where and whether memories are persisted
    #[serde(default)]
    pub storage: StorageConfig,
    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,
    /// Default decay policy
    #[serde(default)]
    pub decay: DecayConfig,
    /// Statistics settings
    #[serde(default)]
    pub stats: StatsConfig,
    /// Capability gateway (embedding/classification model) configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// HTTP binding configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".recollect").join("config.toml")),
            dirs::config_dir().map(|c| c.join("recollect").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecollectError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RecollectError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the memory journal
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Persist mutations to the journal (false = in-memory only)
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: default_persist(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".recollect"))
        .unwrap_or_else(|| PathBuf::from(".recollect"))
}

fn default_persist() -> bool {
    true
}

/// Search defaults applied when a query leaves them unset
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Maximum results per query
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    /// Minimum cosine similarity for a result to be returned
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,
    /// Number of query-text embeddings kept in the LRU cache
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            min_relevance: default_min_relevance(),
            query_cache_capacity: default_query_cache_capacity(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}

fn default_min_relevance() -> f32 {
    0.0
}

fn default_query_cache_capacity() -> usize {
    256
}

/// Decay policy: importance reduction and auto-archival of old memories
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct DecayConfig {
    /// Only memories older than this many days are decayed
    #[serde(default = "default_age_threshold_days")]
    pub age_threshold_days: i64,
    /// Multiplier applied to importance (0.0-1.0)
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Importance at or below which decayed memories are archived
    #[serde(default = "default_min_importance")]
    pub min_importance: u8,
    /// Archive memories whose importance decays to `min_importance`
    #[serde(default = "default_archive_decayed")]
    pub archive_decayed: bool,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            age_threshold_days: default_age_threshold_days(),
            decay_factor: default_decay_factor(),
            min_importance: default_min_importance(),
            archive_decayed: default_archive_decayed(),
        }
    }
}

fn default_age_threshold_days() -> i64 {
    30
}

fn default_decay_factor() -> f64 {
    0.9
}

fn default_min_importance() -> u8 {
    1
}

fn default_archive_decayed() -> bool {
    true
}

/// Statistics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Horizon for counting memories that expire soon
    #[serde(default = "default_expiry_horizon_days")]
    pub expiry_horizon_days: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            expiry_horizon_days: default_expiry_horizon_days(),
        }
    }
}

fn default_expiry_horizon_days() -> i64 {
    7
}

/// Capability gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Provider type: remote, local, hybrid, or none
    #[serde(default = "default_gateway_provider")]
    pub provider: String,
    /// Upper bound for any single gateway call, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    /// Remote API configuration
    #[serde(default)]
    pub remote: RemoteGatewayConfig,
    /// Local embedding model configuration
    #[serde(default)]
    pub local: LocalGatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            timeout_secs: default_gateway_timeout_secs(),
            remote: RemoteGatewayConfig::default(),
            local: LocalGatewayConfig::default(),
        }
    }
}

fn default_gateway_provider() -> String {
    "remote".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

/// Remote OpenAI-compatible API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteGatewayConfig {
    /// API base URL (e.g. https://api.openai.com/v1)
    #[serde(default = "default_remote_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_remote_api_key_env")]
    pub api_key_env: String,
    /// Model used for embeddings
    #[serde(default = "default_remote_embedding_model")]
    pub embedding_model: String,
    /// Model used for categorize/validate/reflect
    #[serde(default = "default_remote_chat_model")]
    pub chat_model: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteGatewayConfig {
    fn default() -> Self {
        Self {
            api_url: default_remote_api_url(),
            api_key_env: default_remote_api_key_env(),
            embedding_model: default_remote_embedding_model(),
            chat_model: default_remote_chat_model(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

fn default_remote_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_remote_api_key_env() -> String {
    "RECOLLECT_API_KEY".to_string()
}

fn default_remote_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_remote_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    20
}

/// Local embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalGatewayConfig {
    /// Embedding model name
    #[serde(default = "default_local_model")]
    pub model: String,
}

impl Default for LocalGatewayConfig {
    fn default() -> Self {
        Self {
            model: default_local_model(),
        }
    }
}

fn default_local_model() -> String {
    "multilingual-e5-small".to_string()
}

/// HTTP binding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}
