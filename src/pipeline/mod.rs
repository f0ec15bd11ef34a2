//! Question-answering pipeline over ingested documents.
//!
//! Ingestion turns a file into a fresh vector collection and returns a [`CollectionHandle`];
//! answering retrieves the closest passages from that collection, builds a grounded prompt,
//! and asks the generation service for a whole or streamed answer.

pub mod chunking;
pub mod conversation;
mod naming;
pub mod prompt;
pub mod service;
pub mod types;

pub use chunking::{Chunk, Chunks, chunk_text};
pub use conversation::{Conversation, Role, Turn};
pub use prompt::{NO_RELEVANT_DOCUMENTS, build_prompt};
pub use service::{AnswerStream, RagApi, RagService, RagSettings, collect_answer};
pub use types::{
    AnswerError, ChunkingError, CollectionHandle, IngestError, IngestOptions, PartialAnswer,
    RetrievalError, RetrievedChunk, ServiceInitError,
};
