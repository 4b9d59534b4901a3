use super::Config;

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    if let Ok(parsed) = value.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {value}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_generation();
        self.apply_env_overrides_corpus();
        self.apply_env_overrides_gateway();
    }

    fn apply_env_overrides_generation(&mut self) {
        // OLLAMA_* first so the RAGLINE_* names win when both are set.
        if let Ok(v) = std::env::var("OLLAMA_HOST") {
            self.generation.backend_url = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_MODEL") {
            self.generation.model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_BACKEND_URL") {
            self.generation.backend_url = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_MODEL") {
            self.generation.model = v;
        }
        if let Some(secs) = parsed("RAGLINE_TIMEOUT_SECS") {
            self.generation.timeout_secs = secs;
        }
        if let Some(n) = parsed("RAGLINE_MAX_RETRIES") {
            self.generation.max_retries = n;
        }
        if let Some(n) = parsed("RAGLINE_MAX_IN_FLIGHT") {
            self.generation.max_in_flight = n;
        }
        if let Some(ms) = parsed("RAGLINE_ADMISSION_TIMEOUT_MS") {
            self.generation.admission_timeout_ms = ms;
        }
    }

    fn apply_env_overrides_corpus(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_EMBEDDING_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Some(n) = parsed("RAGLINE_CHUNK_SIZE") {
            self.splitter.chunk_size = n;
        }
        if let Some(n) = parsed("RAGLINE_CHUNK_OVERLAP") {
            self.splitter.chunk_overlap = n;
        }
        if let Some(k) = parsed("RAGLINE_TOP_K") {
            self.retrieval.top_k = k;
        }
        if let Some(t) = parsed("RAGLINE_SCORE_THRESHOLD") {
            self.retrieval.score_threshold = Some(t);
        }
        if let Ok(v) = std::env::var("RAGLINE_METRIC") {
            if let Ok(metric) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.retrieval.metric = metric;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_METRIC value: {v}");
            }
        }
        if let Some(n) = parsed("RAGLINE_MAX_CONTEXT_TOKENS") {
            self.context.max_tokens = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_SQLITE_PATH") {
            self.storage.sqlite_path = if v.is_empty() { None } else { Some(v) };
        }
    }

    fn apply_env_overrides_gateway(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Some(port) = parsed("RAGLINE_GATEWAY_PORT") {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("RAGLINE_GATEWAY_TOKEN") {
            self.gateway.auth_token = Some(v);
        }
        if let Some(limit) = parsed("RAGLINE_GATEWAY_RATE_LIMIT") {
            self.gateway.rate_limit = limit;
        }
        if let Some(bytes) = parsed("RAGLINE_GATEWAY_MAX_BODY") {
            self.gateway.max_body_size = bytes;
        }
    }
}
