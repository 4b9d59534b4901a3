use std::time::{Duration, Instant};

use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use serde::{Deserialize, Serialize};

use crate::embed::{EmbedFuture, Embedder, validate_embedding};
use crate::error::{EmbeddingError, FailureReason, GenerationFailure};
use crate::generate::{GenerateFuture, GeneratedText, GenerationConfig, Generator};

const DEFAULT_OLLAMA_PORT: u16 = 11434;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Generator backed by Ollama's non-streaming `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
    endpoint: String,
}

impl OllamaGenerator {
    #[must_use]
    pub fn new(config: GenerationConfig) -> Self {
        Self::with_client(crate::http::default_client(), config)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: GenerationConfig) -> Self {
        let endpoint = format!("{}/api/generate", config.backend_url.trim_end_matches('/'));
        Self {
            client,
            config,
            endpoint,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Probe `GET {backend_url}/api/tags` to confirm the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationFailure`] if the backend cannot be reached or answers non-2xx.
    pub async fn health_check(&self) -> Result<(), GenerationFailure> {
        let url = format!("{}/api/tags", self.config.backend_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| GenerationFailure::from_reqwest(&e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(GenerationFailure::new(
                FailureReason::Status(response.status().as_u16()),
                format!("health probe {url} returned {}", response.status()),
            ))
        }
    }

    async fn request(&self, prompt: &str) -> Result<String, GenerationFailure> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationFailure::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationFailure::new(
                FailureReason::Status(status.as_u16()),
                format!("Ollama returned HTTP {status}"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationFailure::from_reqwest(&e))?;

        let parsed: GenerateResponse = serde_json::from_slice(&bytes).map_err(|e| {
            GenerationFailure::new(
                FailureReason::MalformedResponse,
                format!("unexpected Ollama response body: {e}"),
            )
        })?;

        Ok(parsed.response)
    }
}

impl Generator for OllamaGenerator {
    fn generate<'a>(&'a self, prompt: &'a str, timeout: Duration) -> GenerateFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let text = match tokio::time::timeout(timeout, self.request(prompt)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(GenerationFailure::new(
                        FailureReason::Timeout,
                        format!("no response from Ollama within {timeout:?}"),
                    ));
                }
            };

            let elapsed = started.elapsed();
            tracing::debug!(
                model = %self.config.model,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "generation completed"
            );

            Ok(GeneratedText {
                text,
                model: self.config.model.clone(),
                elapsed,
            })
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

/// Embedder backed by Ollama's embeddings API.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    #[must_use]
    pub fn new(base_url: &str, model: String, timeout: Duration) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            timeout,
        }
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.client.list_local_models().await.map_err(|e| {
            EmbeddingError::Unavailable(format!("failed to connect to Ollama, is it running? {e}"))
        })?;
        Ok(())
    }
}

impl Embedder for OllamaEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            let request =
                GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::from(text));

            let response =
                tokio::time::timeout(self.timeout, self.client.generate_embeddings(request))
                    .await
                    .map_err(|_| EmbeddingError::Timeout(self.timeout))?
                    .map_err(|e| {
                        EmbeddingError::Unavailable(format!(
                            "Ollama embedding request failed: {e}"
                        ))
                    })?;

            let vector = response
                .embeddings
                .into_iter()
                .next()
                .ok_or(EmbeddingError::EmptyResponse { provider: "ollama" })?;
            validate_embedding(&vector)?;
            Ok(vector)
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), DEFAULT_OLLAMA_PORT)
}
