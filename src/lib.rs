#![deny(missing_docs)]

//! Core library for pdf-rag: question answering over a single ingested document.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text generation clients.
pub mod generation;
/// Document text extraction.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and question counters.
pub mod metrics;
/// Ingestion and answering pipeline.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector store abstraction.
pub mod store;
