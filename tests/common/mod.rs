#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdfrag::embedding::{EmbeddingClient, EmbeddingClientError, HashEmbeddingClient};
use pdfrag::generation::{FragmentStream, GenerationClient, GenerationError};
use pdfrag::loader::{DocumentLoader, ExtractionError, FileLoader};
use pdfrag::pipeline::{RagService, RagSettings};
use pdfrag::store::{CollectionInfo, ScoredChunk, StoreError, StoredPoint, VectorStore};

/// Vector store kept in process memory; search is brute-force cosine similarity.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<Mutex<HashMap<String, MemoryCollection>>>,
}

struct MemoryCollection {
    dimension: usize,
    embedding_model: Option<String>,
    points: Vec<StoredPoint>,
}

impl InMemoryStore {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .lock()
            .expect("lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn texts(&self, name: &str) -> Vec<String> {
        self.collections
            .lock()
            .expect("lock")
            .get(name)
            .map(|collection| collection.points.iter().map(|p| p.text.clone()).collect())
            .unwrap_or_default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().expect("lock");
        if collections.contains_key(name) {
            return Err(StoreError::Backend(format!("collection {name} exists")));
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                embedding_model: None,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().expect("lock").remove(name);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        Ok(self
            .collections
            .lock()
            .expect("lock")
            .get(name)
            .map(|collection| CollectionInfo {
                dimension: collection.dimension,
                points: Some(collection.points.len() as u64),
            }))
    }

    async fn recorded_embedding_model(&self, name: &str) -> Result<Option<String>, StoreError> {
        let collections = self.collections.lock().expect("lock");
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Ok(collection.embedding_model.clone())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.names())
    }

    async fn insert(
        &self,
        name: &str,
        points: Vec<StoredPoint>,
        embedding_model: &str,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.lock().expect("lock");
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(StoreError::Backend(format!(
                "vector of {} entries in collection of {}",
                bad.vector.len(),
                collection.dimension
            )));
        }
        let count = points.len();
        if count > 0 {
            collection.embedding_model = Some(embedding_model.to_string());
        }
        collection.points.extend(points);
        Ok(count)
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let collections = self.collections.lock().expect("lock");
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        let mut hits: Vec<ScoredChunk> = collection
            .points
            .iter()
            .map(|point| ScoredChunk {
                text: point.text.clone(),
                score: cosine(&vector, &point.vector),
                ordinal: Some(point.ordinal),
            })
            .filter(|hit| score_threshold.is_none_or(|threshold| hit.score >= threshold))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Generator replaying fixed fragments; optionally fails after `fail_after` fragments.
#[derive(Default)]
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_after(fragments: &[&str], fail_after: usize) -> Self {
        Self {
            fail_after: Some(fail_after),
            ..Self::new(fragments)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("lock").last().cloned()
    }

    fn record(&self, prompt: String) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("lock").push(prompt);
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: String) -> Result<String, GenerationError> {
        self.record(prompt);
        if self.fail_after.is_some() {
            return Err(GenerationError::Failed("scripted failure".into()));
        }
        Ok(self.fragments.concat())
    }

    fn complete_streaming(&self, prompt: String) -> FragmentStream {
        self.record(prompt);
        let mut items: Vec<Result<String, GenerationError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(limit) = self.fail_after {
            items.truncate(limit);
            items.push(Err(GenerationError::Interrupted("connection reset".into())));
        }
        Box::pin(futures_util::stream::iter(items))
    }
}

/// Hashing embedder that reports a different model name.
pub struct RenamedEmbedder {
    inner: HashEmbeddingClient,
    model: String,
}

impl RenamedEmbedder {
    pub fn new(model: &str, dimension: usize) -> Self {
        Self {
            inner: HashEmbeddingClient::new(dimension),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for RenamedEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.inner.generate_embeddings(texts).await
    }
}

/// Loader that always panics, standing in for a parser crashing on malformed input.
pub struct PanickingLoader;

impl DocumentLoader for PanickingLoader {
    fn load(&self, _path: &std::path::Path) -> Result<String, ExtractionError> {
        panic!("malformed cross-reference table");
    }
}

pub struct Harness {
    pub service: RagService,
    pub store: InMemoryStore,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn harness(generator: ScriptedGenerator) -> Harness {
    harness_with(generator, RagSettings::default(), InMemoryStore::default(), 64)
}

pub fn harness_with(
    generator: ScriptedGenerator,
    settings: RagSettings,
    store: InMemoryStore,
    dimension: usize,
) -> Harness {
    harness_with_embedder(
        generator,
        settings,
        store,
        Arc::new(HashEmbeddingClient::new(dimension)),
    )
}

pub fn harness_with_embedder(
    generator: ScriptedGenerator,
    settings: RagSettings,
    store: InMemoryStore,
    embedder: Arc<dyn EmbeddingClient>,
) -> Harness {
    let generator = Arc::new(generator);
    let service = RagService::new(
        Arc::new(FileLoader::new()),
        embedder,
        Arc::new(store.clone()),
        generator.clone(),
        settings,
    );
    Harness {
        service,
        store,
        generator,
    }
}

/// Write `contents` to a fresh temporary file called `name`.
pub fn write_document(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pdf-rag-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write document");
    path
}
