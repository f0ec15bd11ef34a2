//! Text extraction from input documents.
//!
//! PDF parsing is delegated to `pdf-extract`; plain-text formats are read as UTF-8. Loading is
//! blocking and CPU-bound, so async callers should run it on the blocking pool.

use std::path::Path;
use thiserror::Error;

/// Errors raised while turning a file into raw text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension is not handled by the loader.
    #[error("Unsupported document type: {0}")]
    Unsupported(String),
    /// File could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// PDF parser rejected the file.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// Document parsed but contained no extractable text.
    #[error("Document contains no extractable text")]
    NoText,
    /// Parser aborted unexpectedly.
    #[error("Document parser panicked: {0}")]
    Panicked(String),
}

/// Interface implemented by document text extractors.
pub trait DocumentLoader: Send + Sync {
    /// Extract the full text of the document at `path`.
    fn load(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Loader dispatching on file extension: `.pdf` through `pdf-extract`, `.txt`/`.md` verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    /// Construct a new loader.
    pub const fn new() -> Self {
        Self
    }
}

impl DocumentLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<String, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = match extension.as_str() {
            "pdf" => {
                let bytes = std::fs::read(path)?;
                pdf_extract::extract_text_from_mem(&bytes)
                    .map_err(|error| ExtractionError::Pdf(error.to_string()))?
            }
            "txt" | "md" | "markdown" => std::fs::read_to_string(path)?,
            other => return Err(ExtractionError::Unsupported(other.to_string())),
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::NoText);
        }

        tracing::debug!(
            path = %path.display(),
            characters = text.chars().count(),
            "Extracted document text"
        );
        Ok(text)
    }
}
