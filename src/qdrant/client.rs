//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::qdrant::{
    payload::{
        EMBEDDING_MODEL_KEY, build_payload, current_timestamp_rfc3339, point_id_for,
        scored_chunk_from_payload,
    },
    types::{
        CollectionInfoResponse, ListCollectionsResponse, QdrantError, QueryResponse,
        QueryResponseResult, ScrollResponse, VectorParams,
    },
};
use crate::store::{CollectionInfo, ScoredChunk, StoreError, StoredPoint, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

const UPSERT_BATCH_SIZE: usize = 256;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("pdf-rag/0.1")
            .timeout(timeout)
            .build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Construct a client from the Qdrant settings in `config`.
    pub fn from_config(config: &Config) -> Result<Self, QdrantError> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }
}

async fn unexpected_status(response: reqwest::Response) -> QdrantError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = QdrantError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Qdrant request failed");
    error
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{name}"))
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from)?;

        self.ensure_success(response, || {
            tracing::debug!(collection = name, dimension, "Collection created");
        })
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{name}"))
            .send()
            .await
            .map_err(QdrantError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = name, "Collection deleted");
        })
        .await?;
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .send()
            .await
            .map_err(QdrantError::from)?;

        match response.status() {
            StatusCode::OK => {
                let payload: CollectionInfoResponse =
                    response.json().await.map_err(QdrantError::from)?;
                let dimension = match payload.result.config.params.vectors {
                    VectorParams::Single { size } => size,
                    VectorParams::Named(_) => {
                        return Err(StoreError::Backend(format!(
                            "collection '{name}' uses named vectors"
                        )));
                    }
                };
                Ok(Some(CollectionInfo {
                    dimension,
                    points: payload.result.points_count,
                }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected_status(response).await.into()),
        }
    }

    async fn recorded_embedding_model(&self, name: &str) -> Result<Option<String>, StoreError> {
        let body = json!({
            "limit": 1,
            "with_payload": [EMBEDDING_MODEL_KEY],
            "with_vector": false,
        });
        let response = self
            .request(Method::POST, &format!("collections/{name}/points/scroll"))
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(unexpected_status(response).await.into());
        }

        let payload: ScrollResponse = response.json().await.map_err(QdrantError::from)?;
        Ok(payload
            .result
            .points
            .into_iter()
            .filter_map(|point| point.payload)
            .find_map(|mut payload| match payload.remove(EMBEDDING_MODEL_KEY) {
                Some(Value::String(model)) if !model.is_empty() => Some(model),
                _ => None,
            }))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .request(Method::GET, "collections")
            .send()
            .await
            .map_err(QdrantError::from)?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await.into());
        }
        let payload: ListCollectionsResponse = response.json().await.map_err(QdrantError::from)?;
        Ok(payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn insert(
        &self,
        name: &str,
        points: Vec<StoredPoint>,
        embedding_model: &str,
    ) -> Result<usize, StoreError> {
        let now = current_timestamp_rfc3339();
        let mut written = 0;

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let serialized: Vec<Value> = batch
                .iter()
                .map(|point| {
                    json!({
                        "id": point_id_for(point),
                        "vector": point.vector,
                        "payload": build_payload(point, embedding_model, &now),
                    })
                })
                .collect();

            let response = self
                .request(Method::PUT, &format!("collections/{name}/points"))
                .query(&[("wait", true)])
                .json(&json!({ "points": serialized }))
                .send()
                .await
                .map_err(QdrantError::from)?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::CollectionNotFound(name.to_string()));
            }
            self.ensure_success(response, || {
                tracing::debug!(collection = name, points = batch.len(), "Points upserted");
            })
            .await?;
            written += batch.len();
        }

        Ok(written)
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("score_threshold".into(), Value::from(threshold));
        }

        let response = self
            .request(Method::POST, &format!("collections/{name}/points/query"))
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(unexpected_status(response).await.into());
        }

        let payload: QueryResponse = response.json().await.map_err(QdrantError::from)?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .filter_map(|point| scored_chunk_from_payload(point.score, point.payload))
            .collect())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    fn service(base_url: String) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("pdf-rag-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
        }
    }

    #[tokio::test]
    async fn search_emits_expected_request_and_maps_hits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body(json!({
                        "query": [0.1, 0.2],
                        "limit": 4,
                        "with_payload": true,
                        "score_threshold": 0.5
                    }));
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "a",
                                "score": 0.92,
                                "payload": { "text": "The sky is blue.", "ordinal": 0 }
                            },
                            {
                                "id": "b",
                                "score": 0.61,
                                "payload": { "text": "Grass is green.", "ordinal": 1 }
                            }
                        ]
                    }
                }));
            })
            .await;

        let hits = service(server.base_url())
            .search("demo", vec![0.1, 0.2], 4, Some(0.5))
            .await
            .expect("search");

        mock.assert();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "The sky is blue.");
        assert_eq!(hits[0].ordinal, Some(0));
        assert!((hits[1].score - 0.61).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_on_empty_collection_returns_no_hits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/empty/points/query");
                then.status(200)
                    .json_body(json!({ "status": "ok", "result": { "points": [] } }));
            })
            .await;

        let hits = service(server.base_url())
            .search("empty", vec![1.0], 4, None)
            .await
            .expect("search");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn create_collection_uses_cosine_distance() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/fresh").json_body(json!({
                    "vectors": { "size": 768, "distance": "Cosine" }
                }));
                then.status(200).json_body(json!({ "result": true, "status": "ok" }));
            })
            .await;

        service(server.base_url())
            .create_collection("fresh", 768)
            .await
            .expect("create");
        mock.assert();
    }

    #[tokio::test]
    async fn insert_writes_payload_with_model_identity() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains("\"embedding_model\":\"nomic-embed-text\"")
                    .body_contains("\"ordinal\":1");
                then.status(200)
                    .json_body(json!({ "result": { "status": "completed" }, "status": "ok" }));
            })
            .await;

        let points = vec![
            StoredPoint {
                text: "first".into(),
                vector: vec![1.0, 0.0],
                ordinal: 0,
                source: "doc.pdf".into(),
            },
            StoredPoint {
                text: "second".into(),
                vector: vec![0.0, 1.0],
                ordinal: 1,
                source: "doc.pdf".into(),
            },
        ];
        let written = service(server.base_url())
            .insert("docs", points, "nomic-embed-text")
            .await
            .expect("insert");

        mock.assert();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn collection_info_reads_vector_size_and_handles_missing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/present");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": {
                        "status": "green",
                        "points_count": 12,
                        "config": { "params": { "vectors": { "size": 768, "distance": "Cosine" } } }
                    }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/absent");
                then.status(404)
                    .json_body(json!({ "status": { "error": "Not found" } }));
            })
            .await;

        let qdrant = service(server.base_url());
        let info = qdrant
            .collection_info("present")
            .await
            .expect("info")
            .expect("collection exists");
        assert_eq!(info.dimension, 768);
        assert_eq!(info.points, Some(12));
        assert!(qdrant.collection_info("absent").await.expect("info").is_none());
    }

    #[tokio::test]
    async fn recorded_embedding_model_reads_first_point_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/scroll")
                    .json_body(json!({
                        "limit": 1,
                        "with_payload": ["embedding_model"],
                        "with_vector": false
                    }));
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": {
                        "points": [
                            { "id": "a", "payload": { "embedding_model": "nomic-embed-text" } }
                        ],
                        "next_page_offset": "b"
                    }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/empty/points/scroll");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "points": [], "next_page_offset": null }
                }));
            })
            .await;

        let qdrant = service(server.base_url());
        let model = qdrant
            .recorded_embedding_model("docs")
            .await
            .expect("scroll");
        mock.assert();
        assert_eq!(model.as_deref(), Some("nomic-embed-text"));
        assert!(
            qdrant
                .recorded_embedding_model("empty")
                .await
                .expect("scroll")
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_tolerates_missing_collection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/gone");
                then.status(404).body("missing");
            })
            .await;

        service(server.base_url())
            .delete_collection("gone")
            .await
            .expect("delete missing collection");
    }

    #[tokio::test]
    async fn list_collections_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(503).body("unavailable");
            })
            .await;

        let error = service(server.base_url())
            .list_collections()
            .await
            .expect_err("error status");
        assert!(matches!(
            error,
            StoreError::Qdrant(QdrantError::UnexpectedStatus { status, .. })
                if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let normalized = normalize_base_url("http://localhost:6333/").expect("url");
        assert_eq!(
            format_endpoint(&normalized, "/collections"),
            "http://localhost:6333/collections"
        );
    }
}
