use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GenerationFailure;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub text: String,
    pub model: String,
    pub elapsed: Duration,
}

pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<GeneratedText, GenerationFailure>> + Send + 'a>>;

/// Text-generation backend.
///
/// A single call never retries; retry policy belongs to the caller.
pub trait Generator: Send + Sync {
    /// Send `prompt` to the backend and wait at most `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationFailure`] carrying a reason code on timeout,
    /// non-success status, malformed body, or transport fault.
    fn generate<'a>(&'a self, prompt: &'a str, timeout: Duration) -> GenerateFuture<'a>;

    fn name(&self) -> &str;
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

/// Explicit backend settings handed to a generator at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GenerationConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_ollama() {
        let config = GenerationConfig::default();
        assert_eq!(config.backend_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: GenerationConfig = serde_json::from_str(r#"{"model":"mistral:7b"}"#).unwrap();
        assert_eq!(config.model, "mistral:7b");
        assert_eq!(config.timeout_secs, 5);
    }
}
