//! Test-only mock embedder and generator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::embed::{EmbedFuture, Embedder};
use crate::error::{EmbeddingError, FailureReason, GenerationFailure};
use crate::generate::{GenerateFuture, GeneratedText, Generator};

#[derive(Debug, Clone)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    pub default_vector: Vec<f32>,
    pub fail: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            vectors: HashMap::new(),
            default_vector: vec![0.5, 0.5, 0.5],
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    #[must_use]
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for MockEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Unavailable("mock embed error".into()));
            }
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| self.default_vector.clone()))
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<Result<String, GenerationFailure>>>>,
    pub default_response: String,
    /// Delay before answering; the caller's timeout still applies.
    pub delay: Duration,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockGenerator {
    /// Answer with the given outcomes in order, then fall back to `default_response`.
    #[must_use]
    pub fn with_outcomes(outcomes: Vec<Result<String, GenerationFailure>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(outcomes)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing(reason: FailureReason) -> Self {
        let outcomes = (0..64)
            .map(|_| Err(GenerationFailure::new(reason, "mock failure")))
            .collect();
        Self::with_outcomes(outcomes)
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the prompt log mutex is poisoned.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for MockGenerator {
    fn generate<'a>(&'a self, prompt: &'a str, timeout: Duration) -> GenerateFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_owned());
            if !self.delay.is_zero() {
                if self.delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(GenerationFailure::new(
                        FailureReason::Timeout,
                        "mock generator exceeded timeout",
                    ));
                }
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    None
                } else {
                    Some(responses.remove(0))
                }
            };
            let text = next.unwrap_or_else(|| Ok(self.default_response.clone()))?;
            Ok(GeneratedText {
                text,
                model: "mock".into(),
                elapsed: self.delay,
            })
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
