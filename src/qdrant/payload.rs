//! Helpers for constructing and reading Qdrant point payloads.

use crate::store::{ScoredChunk, StoredPoint};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Builder;

/// Payload key holding the embedding model a point was embedded with.
pub(crate) const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// Build the payload stored alongside each chunk vector.
pub(crate) fn build_payload(
    point: &StoredPoint,
    embedding_model: &str,
    timestamp_rfc3339: &str,
) -> Value {
    json!({
        "text": point.text,
        "ordinal": point.ordinal,
        "source": point.source,
        EMBEDDING_MODEL_KEY: embedding_model,
        "chunk_hash": compute_chunk_hash(&point.text),
        "ingested_at": timestamp_rfc3339,
    })
}

/// Turn a search hit payload back into a scored chunk; hits without text are dropped.
pub(crate) fn scored_chunk_from_payload(
    score: f32,
    payload: Option<Map<String, Value>>,
) -> Option<ScoredChunk> {
    let mut payload = payload?;
    let text = match payload.remove("text") {
        Some(Value::String(text)) if !text.is_empty() => text,
        _ => return None,
    };
    let ordinal = payload
        .get("ordinal")
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok());
    Some(ScoredChunk {
        text,
        score,
        ordinal,
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Point identifier derived from the chunk's position and content hash.
///
/// Re-upserting the same chunk overwrites its point instead of adding a duplicate.
pub(crate) fn point_id_for(point: &StoredPoint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(point.ordinal.to_le_bytes());
    hasher.update(compute_chunk_hash(&point.text).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}
