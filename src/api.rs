//! HTTP surface for pdf-rag.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents?filename=<name>` – Upload a document as the raw request body. The file is
//!   saved under `UPLOAD_DIR`, ingested into a fresh collection, and the collection handle is
//!   returned.
//! - `POST /documents/path` – Ingest a file that already exists on the server.
//! - `GET /collections` – List collections known to the vector store.
//! - `POST /answer` – Answer a question against a collection, either as JSON or as a chunked
//!   `text/plain` stream of fragments.
//! - `GET /metrics` – Observe ingestion and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::config::Config;
use crate::pipeline::{
    AnswerError, CollectionHandle, IngestError, IngestOptions, RagApi, RetrievalError, Turn,
};
use crate::store::StoreError;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Settings for the HTTP surface.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Directory receiving uploaded documents.
    pub upload_dir: PathBuf,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl ApiSettings {
    /// Extract HTTP settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

struct ApiState<S> {
    service: Arc<S>,
    upload_dir: Arc<PathBuf>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            upload_dir: Arc::clone(&self.upload_dir),
        }
    }
}

/// Build the HTTP router exposing ingestion and answering.
pub fn create_router<S>(service: Arc<S>, settings: ApiSettings) -> Router
where
    S: RagApi + 'static,
{
    let state = ApiState {
        service,
        upload_dir: Arc::new(settings.upload_dir),
    };
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/documents/path", post(ingest_path::<S>))
        .route("/collections", get(list_collections::<S>))
        .route("/answer", post(answer::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .with_state(state)
}

/// Query string for `POST /documents`.
#[derive(Deserialize)]
struct UploadQuery {
    /// Original file name; its extension selects the extractor.
    filename: String,
    /// Optional collection to replace instead of creating a fresh one.
    #[serde(default)]
    collection: Option<String>,
}

/// Save an uploaded document and ingest it.
async fn upload_document<S>(
    State(state): State<ApiState<S>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<CollectionHandle>, AppError>
where
    S: RagApi,
{
    let file_name = Path::new(&query.filename)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::bad_request(format!("invalid filename: {}", query.filename)))?;

    let dir = state.upload_dir.join(Uuid::new_v4().simple().to_string());
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, &body).await?;
    tracing::info!(path = %path.display(), bytes = body.len(), "Upload saved");

    let handle = state
        .service
        .ingest(
            path,
            IngestOptions {
                collection: query.collection,
            },
        )
        .await?;
    Ok(Json(handle))
}

/// Request body for `POST /documents/path`.
#[derive(Deserialize)]
struct PathRequest {
    /// Server-side path of the document.
    path: PathBuf,
    #[serde(default)]
    collection: Option<String>,
}

/// Ingest a document already present on the server.
async fn ingest_path<S>(
    State(state): State<ApiState<S>>,
    Json(request): Json<PathRequest>,
) -> Result<Json<CollectionHandle>, AppError>
where
    S: RagApi,
{
    let handle = state
        .service
        .ingest(
            request.path,
            IngestOptions {
                collection: request.collection,
            },
        )
        .await?;
    tracing::info!(
        collection = handle.name(),
        chunks = handle.chunk_count(),
        "Ingest request completed"
    );
    Ok(Json(handle))
}

/// Response body for `GET /collections`.
#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
}

/// List collections available in the vector store.
async fn list_collections<S>(
    State(state): State<ApiState<S>>,
) -> Result<Json<CollectionsResponse>, AppError>
where
    S: RagApi,
{
    let collections = state.service.list_collections().await?;
    Ok(Json(CollectionsResponse { collections }))
}

/// Request body for `POST /answer`.
#[derive(Deserialize)]
struct AnswerRequest {
    collection: String,
    question: String,
    /// Prior turns, oldest first.
    #[serde(default)]
    history: Vec<Turn>,
    /// Stream fragments as a chunked plain-text body.
    #[serde(default)]
    stream: bool,
}

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
}

/// Answer a question against a collection.
///
/// Streaming responses end with a trailing `[error: ...]` line when generation fails midway,
/// after every fragment produced so far.
async fn answer<S>(
    State(state): State<ApiState<S>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Response, AppError>
where
    S: RagApi,
{
    let handle = state.service.open_collection(&request.collection).await?;

    if !request.stream {
        let answer = state
            .service
            .answer(&handle, &request.question, &request.history)
            .await?;
        return Ok(Json(AnswerResponse { answer }).into_response());
    }

    let fragments = state
        .service
        .answer_stream(&handle, &request.question, &request.history)
        .map(|fragment| {
            Ok::<_, Infallible>(match fragment {
                Ok(text) => Bytes::from(text),
                Err(error) => {
                    tracing::error!(error = %error, "Answer stream failed");
                    Bytes::from(format!("\n[error: {error}]"))
                }
            })
        });
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(fragments),
    )
        .into_response())
}

/// Return the ingestion and question counters.
async fn get_metrics<S>(State(state): State<ApiState<S>>) -> Response
where
    S: RagApi,
{
    Json(state.service.metrics_snapshot()).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents?filename=<name>",
                description: "Upload a PDF as the raw request body and ingest it into a fresh collection. Returns the collection handle.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest_path",
                method: "POST",
                path: "/documents/path",
                description: "Ingest a document that already exists on the server.",
                request_example: Some(json!({ "path": "/data/report.pdf" })),
            },
            CommandDescriptor {
                name: "list_collections",
                method: "GET",
                path: "/collections",
                description: "Return the names of collections in the vector store.",
                request_example: None,
            },
            CommandDescriptor {
                name: "answer",
                method: "POST",
                path: "/answer",
                description: "Answer a question from a collection. Set \"stream\" to receive a chunked text/plain body.",
                request_example: Some(json!({
                    "collection": "rag_documents_report_pdf_1a2b3c4d",
                    "question": "What color is the sky?",
                    "history": [
                        { "role": "user", "content": "Hi" },
                        { "role": "assistant", "content": "Hello!" }
                    ],
                    "stream": false
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and question counters.",
                request_example: None,
            },
        ],
    })
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, self.message).into_response()
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        let status = match &error {
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
            IngestError::InvalidCollectionName(_) => StatusCode::BAD_REQUEST,
            IngestError::Extraction(_) | IngestError::Chunking(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::Embedding(_) => StatusCode::BAD_GATEWAY,
            IngestError::Store(inner) => store_status(inner),
        };
        Self::new(status, error)
    }
}

impl From<RetrievalError> for AppError {
    fn from(error: RetrievalError) -> Self {
        let status = match &error {
            RetrievalError::Store(inner) => store_status(inner),
            RetrievalError::ModelMismatch { .. } | RetrievalError::DimensionMismatch { .. } => {
                StatusCode::CONFLICT
            }
            RetrievalError::Embedding(_) | RetrievalError::EmptyEmbedding => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, error)
    }
}

impl From<AnswerError> for AppError {
    fn from(error: AnswerError) -> Self {
        match error {
            AnswerError::Retrieval(inner) => inner.into(),
            AnswerError::Generation(inner) => Self::new(StatusCode::BAD_GATEWAY, inner),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        Self::new(store_status(&error), error)
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}
