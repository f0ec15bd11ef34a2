//! Vector store abstraction.
//!
//! A store keeps (chunk text, vector) points per named collection and answers
//! nearest-neighbour queries. Every collection holds vectors of a single dimension.

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Target collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// Any other backend failure.
    #[error("Vector store failure: {0}")]
    Backend(String),
}

/// Point written into a collection during ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    /// Verbatim chunk text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
    /// Position of the chunk within its document.
    pub ordinal: usize,
    /// Identifier of the source document (its file name).
    pub source: String,
}

/// Search hit returned by [`VectorStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Stored chunk text.
    pub text: String,
    /// Similarity score; higher is more similar.
    pub score: f32,
    /// Position of the chunk within its document, when recorded.
    pub ordinal: Option<usize>,
}

/// Shape of an existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Vector dimension the collection was created with.
    pub dimension: usize,
    /// Number of stored points, when reported by the backend.
    pub points: Option<u64>,
}

/// Interface implemented by vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create an empty collection for vectors of `dimension` entries.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError>;

    /// Delete a collection; deleting a missing collection succeeds.
    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Describe a collection, or `None` when it does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError>;

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collection_info(name).await?.is_some())
    }

    /// Embedding model recorded with the collection's points, or `None` when it holds none.
    async fn recorded_embedding_model(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Enumerate collection names.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Write points into an existing collection, returning how many were stored.
    async fn insert(
        &self,
        name: &str,
        points: Vec<StoredPoint>,
        embedding_model: &str,
    ) -> Result<usize, StoreError>;

    /// Return up to `limit` points most similar to `vector`, best first.
    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}
