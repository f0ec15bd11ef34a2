use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the question-answering pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama runtime serving chat and embedding models.
    pub ollama_url: String,
    /// Chat-capable model used to generate answers.
    pub chat_model: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Expected dimensionality of produced vectors; inferred from the first batch when unset.
    pub embedding_dimension: Option<usize>,
    /// Number of chunks sent to the embedding provider per request.
    pub embedding_batch_size: usize,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Prefix applied to every collection created by ingestion.
    pub collection_prefix: String,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question.
    pub retrieval_top_k: usize,
    /// Minimum similarity accepted from the vector store, if any.
    pub retrieval_score_threshold: Option<f32>,
    /// Most recent conversation turns included in a prompt.
    pub history_turns: usize,
    /// Timeout applied to non-streaming HTTP calls, in seconds.
    pub request_timeout_secs: u64,
    /// Directory receiving uploaded documents.
    pub upload_dir: PathBuf,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing embeddings, useful offline.
    Hash,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: "http://127.0.0.1:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "nomic-embed-text:latest".to_string(),
            embedding_dimension: None,
            embedding_batch_size: 32,
            qdrant_url: "http://127.0.0.1:6333".to_string(),
            qdrant_api_key: None,
            collection_prefix: "rag_documents".to_string(),
            chunk_size: 800,
            chunk_overlap: 200,
            retrieval_top_k: 4,
            retrieval_score_threshold: None,
            history_turns: 6,
            request_timeout_secs: 120,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 50 * 1024 * 1024,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            chat_model: load_env_optional("CHAT_MODEL").unwrap_or(defaults.chat_model),
            embedding_provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
                None => defaults.embedding_provider,
            },
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?,
            embedding_batch_size: parse_optional("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(defaults.embedding_batch_size),
            qdrant_url: load_env_optional("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            collection_prefix: load_env_optional("COLLECTION_PREFIX")
                .unwrap_or(defaults.collection_prefix),
            chunk_size: parse_optional("CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?
                .unwrap_or(defaults.retrieval_top_k),
            retrieval_score_threshold: parse_optional("RETRIEVAL_SCORE_THRESHOLD")?,
            history_turns: parse_optional("HISTORY_TURNS")?.unwrap_or(defaults.history_turns),
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout_secs),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_BATCH_SIZE".to_string(),
            ));
        }
        if self.embedding_dimension == Some(0) {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        ollama_url = %config.ollama_url,
        qdrant_url = %config.qdrant_url,
        chat_model = %config.chat_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_chunking() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retrieval_top_k, 4);
        assert_eq!(config.history_turns, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk() {
        let config = Config {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key)) if key == "CHUNK_OVERLAP"
        ));
    }

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!(
            "Ollama".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        );
        assert_eq!(
            " hash ".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Hash)
        );
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }
}
