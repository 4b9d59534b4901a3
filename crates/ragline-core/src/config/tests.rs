use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 24] = [
    "OLLAMA_HOST",
    "OLLAMA_MODEL",
    "RAGLINE_BACKEND_URL",
    "RAGLINE_MODEL",
    "RAGLINE_TIMEOUT_SECS",
    "RAGLINE_MAX_RETRIES",
    "RAGLINE_MAX_IN_FLIGHT",
    "RAGLINE_ADMISSION_TIMEOUT_MS",
    "RAGLINE_EMBEDDING_PROVIDER",
    "RAGLINE_EMBEDDING_MODEL",
    "RAGLINE_EMBEDDING_URL",
    "RAGLINE_CHUNK_SIZE",
    "RAGLINE_CHUNK_OVERLAP",
    "RAGLINE_TOP_K",
    "RAGLINE_SCORE_THRESHOLD",
    "RAGLINE_METRIC",
    "RAGLINE_MAX_CONTEXT_TOKENS",
    "RAGLINE_SQLITE_PATH",
    "RAGLINE_GATEWAY_BIND",
    "RAGLINE_GATEWAY_PORT",
    "RAGLINE_GATEWAY_TOKEN",
    "RAGLINE_GATEWAY_RATE_LIMIT",
    "RAGLINE_GATEWAY_MAX_BODY",
    "RAGLINE_CONFIG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.generation.backend_url, "http://localhost:11434");
    assert_eq!(config.generation.model, "llama3");
    assert_eq!(config.generation.timeout_secs, 5);
    assert_eq!(config.generation.max_retries, 1);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
    assert_eq!(config.retrieval.top_k, 4);
    assert!(config.retrieval.score_threshold.is_none());
    assert_eq!(config.retrieval.metric, ragline_memory::Metric::Cosine);
    assert!(config.storage.sqlite_path.is_none());
    assert_eq!(config.gateway.port, 8000);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/ragline.toml")).unwrap();
    assert_eq!(config.generation.model, "llama3");
    assert_eq!(config.context.max_tokens, 2048);
}

#[test]
#[serial]
fn load_parses_every_section() {
    clear_env();
    let file = write_config(
        r#"
[generation]
backend_url = "http://gpu-box:11434"
model = "mistral"
timeout_secs = 30
max_retries = 3
max_in_flight = 2

[embedding]
provider = "ollama"
model = "all-minilm"

[splitter]
chunk_size = 400
chunk_overlap = 50
sentence_aware = false

[retrieval]
top_k = 8
score_threshold = 0.25
metric = "dot"

[context]
max_tokens = 1024

[storage]
sqlite_path = "./data/corpus.db"

[gateway]
port = 9000
auth_token = "secret"
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.generation.backend_url, "http://gpu-box:11434");
    assert_eq!(config.generation.model, "mistral");
    assert_eq!(config.generation.timeout_secs, 30);
    assert_eq!(config.generation.max_retries, 3);
    assert_eq!(config.generation.max_in_flight, 2);
    assert_eq!(config.generation.admission_timeout_ms, 2_000);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.model, "all-minilm");
    assert_eq!(config.splitter.chunk_size, 400);
    assert!(!config.splitter.sentence_aware);
    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(config.retrieval.score_threshold, Some(0.25));
    assert_eq!(config.retrieval.metric, ragline_memory::Metric::Dot);
    assert_eq!(config.context.max_tokens, 1024);
    assert_eq!(config.storage.sqlite_path.as_deref(), Some("./data/corpus.db"));
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.gateway.auth_token.as_deref(), Some("secret"));
    assert_eq!(config.gateway.bind, "127.0.0.1");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_rejects_invalid_toml() {
    clear_env();
    let file = write_config("[generation\nmodel = ");
    let err = Config::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn ollama_env_vars_override_file() {
    clear_env();
    let file = write_config("[generation]\nmodel = \"from-file\"\n");
    unsafe {
        std::env::set_var("OLLAMA_HOST", "http://remote:11434");
        std::env::set_var("OLLAMA_MODEL", "phi3");
    }
    let config = Config::load(file.path()).unwrap();
    clear_env();

    assert_eq!(config.generation.backend_url, "http://remote:11434");
    assert_eq!(config.generation.model, "phi3");
}

#[test]
#[serial]
fn ragline_env_vars_take_precedence_over_ollama() {
    clear_env();
    unsafe {
        std::env::set_var("OLLAMA_MODEL", "phi3");
        std::env::set_var("RAGLINE_MODEL", "qwen2");
        std::env::set_var("RAGLINE_TOP_K", "2");
        std::env::set_var("RAGLINE_EMBEDDING_PROVIDER", "ollama");
        std::env::set_var("RAGLINE_METRIC", "euclidean");
        std::env::set_var("RAGLINE_SQLITE_PATH", "/tmp/ragline.db");
        std::env::set_var("RAGLINE_GATEWAY_TOKEN", "tok");
    }
    let config = Config::load(Path::new("/nonexistent/ragline.toml")).unwrap();
    clear_env();

    assert_eq!(config.generation.model, "qwen2");
    assert_eq!(config.retrieval.top_k, 2);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.retrieval.metric, ragline_memory::Metric::Euclidean);
    assert_eq!(config.storage.sqlite_path.as_deref(), Some("/tmp/ragline.db"));
    assert_eq!(config.gateway.auth_token.as_deref(), Some("tok"));
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("RAGLINE_TOP_K", "many");
        std::env::set_var("RAGLINE_EMBEDDING_PROVIDER", "word2vec");
        std::env::set_var("RAGLINE_GATEWAY_PORT", "99999");
    }
    let config = Config::load(Path::new("/nonexistent/ragline.toml")).unwrap();
    clear_env();

    assert_eq!(config.retrieval.top_k, 4);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
    assert_eq!(config.gateway.port, 8000);
}

#[test]
fn validate_rejects_overlap_not_smaller_than_chunk() {
    let mut config = Config::default();
    config.splitter.chunk_size = 100;
    config.splitter.chunk_overlap = 100;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("chunk_overlap"));
}

#[test]
fn validate_rejects_zero_values() {
    let mut config = Config::default();
    config.retrieval.top_k = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.generation.max_in_flight = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.generation.timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.splitter.max_sentences = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_empty_model() {
    let mut config = Config::default();
    config.generation.model = "  ".into();
    assert!(config.validate().is_err());
}

#[test]
fn generation_section_builds_backend_config() {
    let section = GenerationSection {
        model: "mistral".into(),
        timeout_secs: 9,
        ..GenerationSection::default()
    };
    let backend = section.backend();
    assert_eq!(backend.model, "mistral");
    assert_eq!(backend.timeout_secs, 9);
    assert_eq!(backend.backend_url, section.backend_url);
}

#[test]
#[serial]
fn resolve_config_path_priority() {
    clear_env();
    assert_eq!(
        resolve_config_path(Some(Path::new("custom.toml"))),
        PathBuf::from("custom.toml")
    );
    assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));

    unsafe { std::env::set_var("RAGLINE_CONFIG", "/etc/ragline.toml") };
    assert_eq!(resolve_config_path(None), PathBuf::from("/etc/ragline.toml"));
    assert_eq!(
        resolve_config_path(Some(Path::new("cli.toml"))),
        PathBuf::from("cli.toml")
    );
    clear_env();
}
