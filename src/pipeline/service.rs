//! RAG service coordinating extraction, chunking, embedding, storage, and generation.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, embed_batched, embedding_client_from_config},
    generation::{GenerationClient, OllamaChatClient},
    loader::{DocumentLoader, ExtractionError, FileLoader},
    metrics::{MetricsSnapshot, RagMetrics},
    pipeline::{
        chunking::chunk_text,
        conversation::Turn,
        naming::{fresh_collection_name, is_valid_collection_name},
        prompt::{NO_RELEVANT_DOCUMENTS, build_prompt},
        types::{
            AnswerError, CollectionHandle, IngestError, IngestOptions, PartialAnswer,
            RetrievalError, RetrievedChunk, ServiceInitError,
        },
    },
    qdrant::QdrantService,
    store::{StoreError, StoredPoint, VectorStore},
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Lazy stream of answer fragments; an error, if any, is the last item.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, AnswerError>> + Send>>;

/// Tunables for ingestion and answering.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Required vector dimension, when pinned by configuration.
    pub embedding_dimension: Option<usize>,
    /// Prefix of generated collection names.
    pub collection_prefix: String,
    /// Passages retrieved per question.
    pub retrieval_top_k: usize,
    /// Minimum similarity accepted from the store.
    pub retrieval_score_threshold: Option<f32>,
    /// Conversation turns included in a prompt.
    pub history_turns: usize,
}

impl RagSettings {
    /// Extract pipeline settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embedding_batch_size: config.embedding_batch_size,
            embedding_dimension: config.embedding_dimension,
            collection_prefix: config.collection_prefix.clone(),
            retrieval_top_k: config.retrieval_top_k,
            retrieval_score_threshold: config.retrieval_score_threshold,
            history_turns: config.history_turns,
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Coordinates ingestion of documents and grounded answering over them.
///
/// Collaborators are shared behind `Arc`s so the service is cheap to clone and answer streams
/// can own what they need without borrowing the service.
#[derive(Clone)]
pub struct RagService {
    loader: Arc<dyn DocumentLoader>,
    embedding_client: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationClient>,
    settings: Arc<RagSettings>,
    metrics: Arc<RagMetrics>,
}

/// Abstraction over the service used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Ingest the document at `path`.
    async fn ingest(
        &self,
        path: PathBuf,
        options: IngestOptions,
    ) -> Result<CollectionHandle, IngestError>;

    /// Rebuild a handle for an existing collection.
    async fn open_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError>;

    /// Enumerate collections known to the store.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Answer a question in full.
    async fn answer(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> Result<String, AnswerError>;

    /// Answer a question as a stream of fragments.
    fn answer_stream(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> AnswerStream;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RagService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedding_client: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationClient>,
        settings: RagSettings,
    ) -> Self {
        Self {
            loader,
            embedding_client,
            store,
            generator,
            settings: Arc::new(settings),
            metrics: Arc::new(RagMetrics::new()),
        }
    }

    /// Wire the default adapters (file loader, Ollama, Qdrant) from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!(
            provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            chat_model = %config.chat_model,
            "Initializing RAG service"
        );
        let embedding_client: Arc<dyn EmbeddingClient> =
            Arc::from(embedding_client_from_config(config)?);
        let store = QdrantService::from_config(config)?;
        let generator = OllamaChatClient::from_config(config)?;

        Ok(Self::new(
            Arc::new(FileLoader::new()),
            embedding_client,
            Arc::new(store),
            Arc::new(generator),
            RagSettings::from_config(config),
        ))
    }

    /// Active settings.
    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Ingest a document into a brand-new collection.
    pub async fn ingest(&self, path: &Path) -> Result<CollectionHandle, IngestError> {
        self.ingest_with(path, IngestOptions::default()).await
    }

    /// Ingest a document, optionally replacing a named collection.
    pub async fn ingest_with(
        &self,
        path: &Path,
        options: IngestOptions,
    ) -> Result<CollectionHandle, IngestError> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            tracing::warn!(path = %path.display(), "Document not found");
            return Err(IngestError::NotFound(path.to_path_buf()));
        }
        if let Some(name) = options.collection.as_deref()
            && !is_valid_collection_name(name)
        {
            return Err(IngestError::InvalidCollectionName(name.to_string()));
        }

        tracing::info!(path = %path.display(), "Ingesting document");
        let text = self.load_text(path).await?;
        let settings = &self.settings;
        let chunks: Vec<String> = chunk_text(&text, settings.chunk_size, settings.chunk_overlap)?
            .map(|chunk| chunk.text.to_string())
            .collect();
        tracing::debug!(
            characters = text.chars().count(),
            chunks = chunks.len(),
            chunk_size = settings.chunk_size,
            overlap = settings.chunk_overlap,
            "Document chunked"
        );

        let vectors = embed_batched(
            self.embedding_client.as_ref(),
            chunks.clone(),
            settings.embedding_batch_size,
            settings.embedding_dimension,
        )
        .await?;
        let Some(dimension) = vectors.first().map(Vec::len) else {
            return Err(ExtractionError::NoText.into());
        };

        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        let name = match options.collection {
            Some(name) => {
                if self.store.collection_exists(&name).await? {
                    tracing::info!(collection = %name, "Replacing existing collection");
                    self.store.delete_collection(&name).await?;
                }
                name
            }
            None => fresh_collection_name(&settings.collection_prefix, path),
        };
        self.store.create_collection(&name, dimension).await?;

        let source_label = source.clone().unwrap_or_default();
        let points: Vec<StoredPoint> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (text, vector))| StoredPoint {
                text,
                vector,
                ordinal,
                source: source_label.clone(),
            })
            .collect();
        let model = self.embedding_client.model();
        let chunk_count = self.store.insert(&name, points, model).await?;

        self.metrics.record_ingestion(chunk_count as u64);
        tracing::info!(
            collection = %name,
            chunks = chunk_count,
            dimension,
            embedding_model = model,
            "Document indexed"
        );

        Ok(CollectionHandle::new(
            name,
            model.to_string(),
            dimension,
            chunk_count,
            source,
        ))
    }

    /// Extract text on the blocking pool, reporting parser panics as extraction errors.
    async fn load_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let loader = Arc::clone(&self.loader);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Document loader aborted");
                ExtractionError::Panicked(error.to_string())
            })?
    }

    /// Rebuild a handle for an existing collection.
    ///
    /// The handle carries the embedding model recorded at ingestion, so [`Self::retrieve`]
    /// rejects queries once the configured model has changed. A collection without points
    /// records no model and takes the active one.
    pub async fn open_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError> {
        let info = self
            .store
            .collection_info(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        let chunk_count = info
            .points
            .and_then(|points| usize::try_from(points).ok())
            .unwrap_or(0);
        let embedding_model = match self.store.recorded_embedding_model(name).await? {
            Some(model) => model,
            None => self.embedding_client.model().to_string(),
        };
        tracing::debug!(
            collection = name,
            dimension = info.dimension,
            chunk_count,
            embedding_model = %embedding_model,
            "Collection opened"
        );
        Ok(CollectionHandle::new(
            name.to_string(),
            embedding_model,
            info.dimension,
            chunk_count,
            None,
        ))
    }

    /// Enumerate collections known to the store.
    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_collections().await
    }

    /// Return up to `k` passages most similar to `query`, best first.
    ///
    /// An empty collection, or one with no hit above the score threshold, yields an empty list.
    pub async fn retrieve(
        &self,
        handle: &CollectionHandle,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let client_model = self.embedding_client.model();
        if client_model != handle.embedding_model() {
            return Err(RetrievalError::ModelMismatch {
                collection_model: handle.embedding_model().to_string(),
                client_model: client_model.to_string(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;
        if vector.len() != handle.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: handle.dimension(),
                actual: vector.len(),
            });
        }

        let hits = self
            .store
            .search(
                handle.name(),
                vector,
                k,
                self.settings.retrieval_score_threshold,
            )
            .await?;
        let mut chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.text,
                score: hit.score,
                ordinal: hit.ordinal,
            })
            .collect();
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        chunks.truncate(k);

        tracing::debug!(
            collection = handle.name(),
            requested = k,
            returned = chunks.len(),
            "Passages retrieved"
        );
        Ok(chunks)
    }

    /// Answer `question` from the document behind `handle`.
    pub async fn answer(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> Result<String, AnswerError> {
        let prompt = match self.prepare_prompt(handle, question, history).await {
            Ok(Some(prompt)) => prompt,
            Ok(None) => return Ok(NO_RELEVANT_DOCUMENTS.to_string()),
            Err(error) => {
                self.metrics.record_failed_answer();
                return Err(error.into());
            }
        };
        let answer = self.generator.complete(prompt).await.inspect_err(|_| {
            self.metrics.record_failed_answer();
        })?;
        self.metrics.record_answer();
        tracing::info!(collection = handle.name(), "Answer generated");
        Ok(answer)
    }

    /// Answer `question` as a lazy stream of fragments.
    ///
    /// Nothing is retrieved or generated until the stream is first polled. If generation fails
    /// midway, fragments already yielded stay valid and the error is the final item.
    pub fn answer_stream(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> AnswerStream {
        Box::pin(stream_answer(
            self.clone(),
            handle.clone(),
            question.to_string(),
            history.to_vec(),
        ))
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Retrieve passages and build the prompt; `None` when nothing relevant was found.
    async fn prepare_prompt(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> Result<Option<String>, RetrievalError> {
        let passages = self
            .retrieve(handle, question, self.settings.retrieval_top_k)
            .await?;
        if passages.is_empty() {
            self.metrics.record_empty_retrieval();
            tracing::info!(collection = handle.name(), "No relevant passages found");
            return Ok(None);
        }

        let texts: Vec<&str> = passages.iter().map(|chunk| chunk.text.as_str()).collect();
        Ok(Some(build_prompt(
            &texts,
            history,
            self.settings.history_turns,
            question,
        )))
    }
}

fn stream_answer(
    service: RagService,
    handle: CollectionHandle,
    question: String,
    history: Vec<Turn>,
) -> impl Stream<Item = Result<String, AnswerError>> + Send {
    let metrics = Arc::clone(&service.metrics);
    answer_fragments(service, handle, question, history)
        .inspect_err(move |_| metrics.record_failed_answer())
}

fn answer_fragments(
    service: RagService,
    handle: CollectionHandle,
    question: String,
    history: Vec<Turn>,
) -> impl Stream<Item = Result<String, AnswerError>> + Send {
    try_stream! {
        match service.prepare_prompt(&handle, &question, &history).await? {
            None => {
                yield NO_RELEVANT_DOCUMENTS.to_string();
            }
            Some(prompt) => {
                let mut fragments = service.generator.complete_streaming(prompt);
                while let Some(fragment) = fragments.next().await {
                    yield fragment?;
                }
                service.metrics.record_answer();
                tracing::info!(collection = handle.name(), "Answer streamed");
            }
        }
    }
}

/// Drain an answer stream, keeping the text produced before any error.
pub async fn collect_answer(mut stream: AnswerStream) -> PartialAnswer {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) => text.push_str(&fragment),
            Err(error) => {
                return PartialAnswer {
                    text,
                    error: Some(error),
                };
            }
        }
    }
    PartialAnswer { text, error: None }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(
        &self,
        path: PathBuf,
        options: IngestOptions,
    ) -> Result<CollectionHandle, IngestError> {
        RagService::ingest_with(self, &path, options).await
    }

    async fn open_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError> {
        RagService::open_collection(self, name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        RagService::list_collections(self).await
    }

    async fn answer(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> Result<String, AnswerError> {
        RagService::answer(self, handle, question, history).await
    }

    fn answer_stream(
        &self,
        handle: &CollectionHandle,
        question: &str,
        history: &[Turn],
    ) -> AnswerStream {
        RagService::answer_stream(self, handle, question, history)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }
}
