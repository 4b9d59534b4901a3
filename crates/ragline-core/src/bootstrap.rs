//! Application bootstrap: backend, corpus and pipeline construction from config.

use std::sync::Arc;

use anyhow::Context;
use ragline_llm::hash::HashEmbedder;
use ragline_llm::ollama::{OllamaEmbedder, OllamaGenerator};
use ragline_llm::{Embedder, Generator};
use ragline_memory::{ChunkStore, Corpus, ExactIndex, SqliteCorpusStore, TextSplitter, VectorIndex};

use crate::config::{Config, EmbeddingProvider};
use crate::pipeline::{Pipeline, PipelinePolicy};
use crate::retriever::Retriever;

/// Concrete embedder, kept so startup checks can reach backend-specific probes.
enum EmbedderKind {
    Hash(Arc<HashEmbedder>),
    Ollama(Arc<OllamaEmbedder>),
}

impl EmbedderKind {
    fn as_dyn(&self) -> Arc<dyn Embedder> {
        match self {
            Self::Hash(e) => Arc::clone(e) as Arc<dyn Embedder>,
            Self::Ollama(e) => Arc::clone(e) as Arc<dyn Embedder>,
        }
    }
}

fn create_embedder(config: &Config) -> EmbedderKind {
    match config.embedding.provider {
        EmbeddingProvider::Hash => {
            EmbedderKind::Hash(Arc::new(HashEmbedder::new(config.embedding.dimensions)))
        }
        EmbeddingProvider::Ollama => {
            let base_url = config
                .embedding
                .base_url
                .as_deref()
                .unwrap_or(&config.generation.backend_url);
            EmbedderKind::Ollama(Arc::new(OllamaEmbedder::new(
                base_url,
                config.embedding.model.clone(),
                config.embedding.timeout(),
            )))
        }
    }
}

/// Fully wired application: corpus for writes, pipeline for questions.
pub struct App {
    config: Config,
    embedder: EmbedderKind,
    /// Set when generation goes to Ollama, for the startup probe.
    ollama: Option<Arc<OllamaGenerator>>,
    corpus: Arc<Corpus>,
    pipeline: Arc<Pipeline>,
}

impl App {
    /// Build every component from `config` and restore a persisted corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` corpus cannot be opened or restored.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let ollama = Arc::new(OllamaGenerator::new(config.generation.backend()));
        let mut app = Self::build_with_generator(config, Arc::clone(&ollama) as Arc<dyn Generator>).await?;
        app.ollama = Some(ollama);
        Ok(app)
    }

    /// Same as [`App::build`] with a caller-supplied generation backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` corpus cannot be opened or restored.
    pub async fn build_with_generator(
        config: Config,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config);
        let index: Arc<dyn VectorIndex> = Arc::new(ExactIndex::new(config.retrieval.metric));
        let mut corpus = Corpus::new(
            embedder.as_dyn(),
            TextSplitter::new(config.splitter.clone()),
            Arc::new(ChunkStore::new()),
            index,
        );

        if let Some(path) = &config.storage.sqlite_path {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory for {path}"))?;
            }
            let sqlite = SqliteCorpusStore::new(path)
                .await
                .with_context(|| format!("failed to open corpus database {path}"))?;
            corpus = corpus.with_persistence(sqlite);
        }

        let corpus = Arc::new(corpus);
        corpus.restore().await.context("failed to restore corpus")?;

        let retriever =
            Retriever::new(Arc::clone(&corpus)).with_score_threshold(config.retrieval.score_threshold);
        let pipeline = Arc::new(Pipeline::new(
            retriever,
            Arc::clone(&generator),
            PipelinePolicy::from_config(&config),
        ));

        let embedder_name = embedder.as_dyn().name().to_owned();
        tracing::info!(
            embedder = %embedder_name,
            generator = generator.name(),
            model = %config.generation.model,
            backend = %config.generation.backend_url,
            persistent = config.storage.sqlite_path.is_some(),
            "application ready"
        );

        Ok(Self {
            config,
            embedder,
            ollama: None,
            corpus,
            pipeline,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Probe the embedding and generation backends. Failures are logged, not returned.
    ///
    /// Returns `true` when every backend answered.
    pub async fn health_check(&self) -> bool {
        let mut healthy = true;
        if let EmbedderKind::Ollama(embedder) = &self.embedder
            && let Err(e) = embedder.health_check().await
        {
            tracing::warn!(error = %e, "embedding backend unavailable; ingestion and retrieval will degrade");
            healthy = false;
        }
        if let Some(generator) = &self.ollama
            && let Err(e) = generator.health_check().await
        {
            tracing::warn!(error = %e, "generation backend unavailable; answers will use the fallback");
            healthy = false;
        }
        healthy
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("corpus", &self.corpus)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
