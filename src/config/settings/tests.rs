use super::*;
use serial_test::serial;
use std::collections::HashMap;
use tempfile::TempDir;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, ProviderKind::OpenAi);
    assert_eq!(config.embedding.model, "text-embedding-3-small");
    assert_eq!(config.indexing.chunk_size, 900);
    assert_eq!(config.indexing.chunk_overlap, 150);
    assert_eq!(config.indexing.batch_size, 80);
    assert_eq!(config.indexing.max_chars_per_file, 400_000);
    assert_eq!(config.indexing.min_chunk_len, 40);
    assert_eq!(config.retrieval.top_k, 4);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid = config.clone();
    invalid.indexing.chunk_overlap = invalid.indexing.chunk_size;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::OverlapNotSmallerThanChunk { .. })
    ));

    let mut invalid = config.clone();
    invalid.indexing.min_chunk_len = 1000;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::MinChunkLenTooLarge { .. })
    ));

    let mut invalid = config.clone();
    invalid.indexing.batch_size = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.indexing.text_flush_bytes = 10;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidBufferSize {
            name: "text_flush_bytes",
            ..
        })
    ));

    let mut invalid = config.clone();
    invalid.embedding.model = "  ".to_string();
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.embedding.base_url = Some("ftp://example.com".to_string());
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid = config.clone();
    invalid.retrieval.min_score = f32::NAN;
    assert!(invalid.validate().is_err());

    let mut invalid = config;
    invalid.retrieval.top_k = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn provider_default_endpoints() {
    let mut embedding = EmbeddingConfig::default();
    assert_eq!(
        embedding.endpoint().expect("valid endpoint").as_str(),
        "https://api.openai.com/"
    );

    embedding.set_provider(ProviderKind::Ollama);
    assert_eq!(
        embedding.endpoint().expect("valid endpoint").as_str(),
        "http://localhost:11434/"
    );

    embedding
        .set_base_url("http://gpu-box:11434".to_string())
        .expect("valid url");
    assert_eq!(
        embedding.endpoint().expect("valid endpoint").host_str(),
        Some("gpu-box")
    );

    // Switching provider drops the custom endpoint
    embedding.set_provider(ProviderKind::OpenAi);
    assert_eq!(embedding.base_url, None);
}

#[test]
fn provider_kind_parsing() {
    assert_eq!("openai".parse::<ProviderKind>().ok(), Some(ProviderKind::OpenAi));
    assert_eq!(" Ollama ".parse::<ProviderKind>().ok(), Some(ProviderKind::Ollama));
    assert!("cohere".parse::<ProviderKind>().is_err());
    assert_eq!(ProviderKind::Ollama.to_string(), "ollama");
}

#[test]
fn toml_serialization() {
    let mut config = Config::default();
    config.embedding.set_provider(ProviderKind::Ollama);
    config.embedding.model = "nomic-embed-text:latest".to_string();
    config.indexing.chunk_size = 500;

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(toml_str.contains("provider = \"ollama\""));
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [indexing]
        chunk_size = 1200
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.indexing.chunk_size, 1200);
    assert_eq!(parsed.indexing.chunk_overlap, 150);
    assert_eq!(parsed.embedding, EmbeddingConfig::default());
}

#[test]
fn overrides_apply_parsed_values() {
    let mut config = Config::default();
    config
        .apply_overrides_from(lookup_from(&[
            ("KB_CHUNK_SIZE", "600"),
            ("KB_CHUNK_OVERLAP", " 100 "),
            ("KB_EMBEDDING_PROVIDER", "ollama"),
            ("KB_EMBEDDING_MODEL", "mxbai-embed-large"),
            ("RAG_TOP_K", "8"),
            ("RAG_MIN_SCORE", "0.35"),
            ("KB_INDEX_PATH", "/srv/kb/index.json"),
        ]))
        .expect("overrides should apply");

    assert_eq!(config.indexing.chunk_size, 600);
    assert_eq!(config.indexing.chunk_overlap, 100);
    assert_eq!(config.embedding.provider, ProviderKind::Ollama);
    assert_eq!(config.embedding.model, "mxbai-embed-large");
    assert_eq!(config.retrieval.top_k, 8);
    assert!((config.retrieval.min_score - 0.35).abs() < f32::EPSILON);
    assert_eq!(
        config.retrieval.index_path,
        PathBuf::from("/srv/kb/index.json")
    );
}

#[test]
fn unparsable_override_is_rejected() {
    let mut config = Config::default();
    let err = config
        .apply_overrides_from(lookup_from(&[("KB_BATCH_SIZE", "lots")]))
        .expect_err("should reject non-numeric batch size");
    assert!(matches!(err, ConfigError::InvalidEnvValue { ref name, .. } if name == "KB_BATCH_SIZE"));
}

#[test]
#[serial]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.indexing, IndexingConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
#[serial]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.indexing.set_batch_size(32).expect("valid batch size");
    config
        .embedding
        .set_model("text-embedding-3-large".to_string())
        .expect("valid model");
    config.save().expect("should save config");

    assert!(config.config_file_path().exists());
    let loaded = Config::load(temp_dir.path().join("nested")).expect("should reload config");
    assert_eq!(loaded.indexing.batch_size, 32);
    assert_eq!(loaded.embedding.model, "text-embedding-3-large");
}

#[test]
#[serial]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[indexing]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .expect("should write config");
    assert!(Config::load(temp_dir.path()).is_err());

    fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "[indexing\n").expect("should write config");
    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn setter_validation() {
    let mut embedding = EmbeddingConfig::default();
    assert!(embedding.set_model(String::new()).is_err());
    assert!(embedding.set_base_url("not a url".to_string()).is_err());
    assert!(embedding.set_base_url("https://proxy.internal/".to_string()).is_ok());

    let mut indexing = IndexingConfig::default();
    assert!(indexing.set_batch_size(0).is_err());
    assert!(indexing.set_batch_size(4096).is_err());
    assert!(indexing.set_batch_size(16).is_ok());
}
