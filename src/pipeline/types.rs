//! Core data types and error definitions for the question-answering pipeline.

use crate::{
    embedding::EmbeddingClientError, generation::GenerationError, loader::ExtractionError,
    qdrant::QdrantError, store::StoreError,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would stop chunks from advancing.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured overlap in characters.
        overlap: usize,
        /// Configured chunk size in characters.
        chunk_size: usize,
    },
}

/// Errors emitted while ingesting a document.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Input path does not name an existing regular file.
    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Explicit collection name contains characters the store rejects.
    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),
    /// Text extraction failed.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking parameters were rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed or returned inconsistent vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected the collection or its points.
    #[error("Failed to store document: {0}")]
    Store(#[from] StoreError),
}

/// Errors emitted while retrieving passages for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to return a vector for the query text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// Query would be embedded with a different model than the collection.
    #[error(
        "Embedding model mismatch: collection uses '{collection_model}', client uses '{client_model}'"
    )]
    ModelMismatch {
        /// Model recorded on the collection handle.
        collection_model: String,
        /// Model of the active embedding client.
        client_model: String,
    },
    /// Query vector length does not match the collection.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the collection.
        expected: usize,
        /// Dimension of the query vector.
        actual: usize,
    },
    /// Vector store search failed.
    #[error("Vector search failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors emitted while answering a question.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Passage retrieval failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Generation failed before or during the answer.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Embedding client could not be constructed.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant client could not be constructed.
    #[error("Failed to initialize Qdrant client: {0}")]
    Qdrant(#[from] QdrantError),
    /// Generation client could not be constructed.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationError),
}

/// Reference to an ingested document's collection.
///
/// Handles are produced by ingestion or by reopening an existing collection, and carry the
/// embedding model identity so queries are never embedded with a different model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionHandle {
    name: String,
    embedding_model: String,
    dimension: usize,
    chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl CollectionHandle {
    pub(crate) fn new(
        name: String,
        embedding_model: String,
        dimension: usize,
        chunk_count: usize,
        source: Option<String>,
    ) -> Self {
        Self {
            name,
            embedding_model,
            dimension,
            chunk_count,
            source,
        }
    }

    /// Collection name in the vector store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model that produced the stored vectors.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Vector dimension of the collection.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of chunks stored.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// File name of the ingested document, when known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Passage returned by retrieval, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Verbatim chunk text.
    pub text: String,
    /// Similarity score reported by the store.
    pub score: f32,
    /// Position of the chunk within its document, when recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
}

/// Options accepted by [`crate::pipeline::RagService::ingest_with`].
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Target collection; an existing collection with this name is replaced.
    pub collection: Option<String>,
}

/// Answer text gathered from a stream, plus the error that cut it short, if any.
#[derive(Debug)]
pub struct PartialAnswer {
    /// Fragments received before the stream ended.
    pub text: String,
    /// Error that terminated the stream early.
    pub error: Option<AnswerError>,
}

impl PartialAnswer {
    /// Convert into a `Result`, discarding partial text on error.
    pub fn into_result(self) -> Result<String, AnswerError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.text),
        }
    }
}
