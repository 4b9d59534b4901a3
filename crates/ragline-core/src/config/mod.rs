mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.generation.backend_url.trim().is_empty() {
            bail!("generation.backend_url must not be empty");
        }
        if self.generation.model.trim().is_empty() {
            bail!("generation.model must not be empty");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be at least 1");
        }
        if self.generation.max_in_flight == 0 {
            bail!("generation.max_in_flight must be at least 1");
        }
        if self.splitter.chunk_size == 0 {
            bail!("splitter.chunk_size must be at least 1");
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            bail!(
                "splitter.chunk_overlap ({}) must be smaller than splitter.chunk_size ({})",
                self.splitter.chunk_overlap,
                self.splitter.chunk_size
            );
        }
        if self.splitter.max_sentences == Some(0) {
            bail!("splitter.max_sentences must be at least 1 when set");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if let Some(threshold) = self.retrieval.score_threshold
            && !threshold.is_finite()
        {
            bail!("retrieval.score_threshold must be a finite number");
        }
        if self.context.max_tokens == 0 {
            bail!("context.max_tokens must be at least 1");
        }
        if self.embedding.provider == EmbeddingProvider::Hash && self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be at least 1");
        }
        if self.gateway.max_body_size == 0 {
            bail!("gateway.max_body_size must be at least 1");
        }
        Ok(())
    }
}

/// Priority: `--config` argument > `RAGLINE_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("RAGLINE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
