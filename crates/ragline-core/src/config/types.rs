use std::time::Duration;

use ragline_llm::GenerationConfig;
use ragline_memory::{Metric, SplitterConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_backend_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama3".into()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_in_flight() -> usize {
    8
}

fn default_admission_timeout_ms() -> u64 {
    2_000
}

/// `[generation]`: backend connection plus the orchestrator's retry and admission policy.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_admission_timeout_ms")]
    pub admission_timeout_ms: u64,
}

impl GenerationSection {
    #[must_use]
    pub fn backend(&self) -> GenerationConfig {
        GenerationConfig {
            backend_url: self.backend_url.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_in_flight: default_max_in_flight(),
            admission_timeout_ms: default_admission_timeout_ms(),
        }
    }
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    /// Local feature hashing; needs no running service.
    #[default]
    Hash,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_embedding_dimensions() -> usize {
    ragline_llm::hash::DEFAULT_DIMENSIONS
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Defaults to `generation.backend_url`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Vector length of the hash provider.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            base_url: None,
            dimensions: default_embedding_dimensions(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring below this are dropped. Unset keeps every hit.
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: None,
            metric: Metric::default(),
        }
    }
}

fn default_max_tokens() -> usize {
    2048
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` file for the corpus; unset keeps the corpus in memory only.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_rate_limit() -> u32 {
    120
}

fn default_gateway_max_body() -> usize {
    1_048_576
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Requests per minute per client IP; 0 disables limiting.
    #[serde(default = "default_gateway_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: None,
            rate_limit: default_gateway_rate_limit(),
            max_body_size: default_gateway_max_body(),
        }
    }
}
