//! Embedding client abstraction and adapters.
//!
//! The Ollama adapter talks to `/api/embed` directly over HTTP. The hashing adapter is
//! deterministic and needs no service, which makes it handy for offline runs and tests.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_HASH_DIMENSION: usize = 256;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Returned vectors disagree on dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension established by configuration or the first vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identity of the model producing vectors; collections are bound to it.
    fn model(&self) -> &str;

    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("pdf-rag/embed")
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingClientError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, inputs = expected, "Requesting embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "model '{}' not found: {body}",
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::CountMismatch {
                expected,
                actual: body.embeddings.len(),
            });
        }

        Ok(body.embeddings)
    }
}

/// Deterministic embedding client that hashes bytes into a fixed-size unit vector.
pub struct HashEmbeddingClient {
    dimension: usize,
    model: String,
}

impl HashEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: format!("hash-{dimension}"),
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Embed `texts` in batches, checking that every vector shares one dimension.
///
/// When `expected_dimension` is `None` the first returned vector fixes the dimension.
pub async fn embed_batched(
    client: &dyn EmbeddingClient,
    texts: Vec<String>,
    batch_size: usize,
    expected_dimension: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    let batch_size = batch_size.max(1);
    let mut dimension = expected_dimension;
    let mut vectors = Vec::with_capacity(texts.len());
    let mut pending = texts.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<String> = pending.by_ref().take(batch_size).collect();
        let requested = batch.len();
        let embedded = client.generate_embeddings(batch).await?;
        if embedded.len() != requested {
            return Err(EmbeddingClientError::CountMismatch {
                expected: requested,
                actual: embedded.len(),
            });
        }

        for vector in embedded {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected || expected == 0 {
                return Err(EmbeddingClientError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
        }
        tracing::debug!(embedded = vectors.len(), "Embedded batch");
    }

    Ok(vectors)
}

/// Build an embedding client suitable for the given configuration.
pub fn embedding_client_from_config(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?)),
        EmbeddingProvider::Hash => Ok(Box::new(HashEmbeddingClient::new(
            config.embedding_dimension.unwrap_or(DEFAULT_HASH_DIMENSION),
        ))),
    }
}
