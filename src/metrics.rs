use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question-answering activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    empty_retrievals: AtomicU64,
    failed_answers: AtomicU64,
    last_chunk_count: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_ingestion(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record a question answered by the model.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question answered with the fixed no-documents message.
    pub fn record_empty_retrieval(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        self.empty_retrievals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question whose retrieval or generation failed.
    pub fn record_failed_answer(&self) {
        self.failed_answers.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let documents_ingested = self.documents_ingested.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_ingested,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            empty_retrievals: self.empty_retrievals.load(Ordering::Relaxed),
            failed_answers: self.failed_answers.load(Ordering::Relaxed),
            last_chunk_count: (documents_ingested > 0)
                .then(|| self.last_chunk_count.load(Ordering::Relaxed)),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents ingested since startup.
    pub documents_ingested: u64,
    /// Total chunk count stored across all ingested documents.
    pub chunks_indexed: u64,
    /// Questions answered in full, including ones short-circuited by empty retrieval.
    pub questions_answered: u64,
    /// Questions for which retrieval returned no passages.
    pub empty_retrievals: u64,
    /// Questions that ended in an error, possibly after partial output.
    pub failed_answers: u64,
    /// Chunk count of the most recent ingestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
}
