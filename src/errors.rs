use std::io;

use thiserror::Error;

/// Error type for masking, packing, record encoding, and sink failures.
#[derive(Debug, Error)]
pub enum MlmError {
    #[error("word segmentation failed: {reason}")]
    Segmentation { reason: String },
    #[error("tokenization of '{word}' failed: {reason}")]
    Tokenization { word: String, reason: String },
    #[error("record schema violation on '{field}': expected {expected} values, found {actual}")]
    SchemaViolation {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    #[error("record sink failure: {0}")]
    Sink(String),
    #[error("corpus entry at {location} is unreadable: {reason}")]
    Corpus { location: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl MlmError {
    /// Returns `true` for failures that only invalidate the current paragraph.
    pub fn is_paragraph_local(&self) -> bool {
        matches!(
            self,
            MlmError::Segmentation { .. } | MlmError::Tokenization { .. } | MlmError::Corpus { .. }
        )
    }
}
