//! Error types for Docent operations

use thiserror::Error;

use crate::types::ValidationError;

/// Failures surfaced by [`crate::Docent`]; each maps to one HTTP response shape
#[derive(Debug, Error)]
pub enum DocentError {
    /// Request payload failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Record missing, or owned by another user
    #[error("{0} not found")]
    NotFound(String),

    /// Question embedding or vector search failed
    #[error("Failed to retrieve context: {0}")]
    Retrieval(String),

    /// Answer generation failed
    #[error("LLM processing failed: {0}")]
    Llm(String),

    /// Extraction, embedding or storage of an upload failed
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Speech synthesis failed
    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    /// Anything else
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DocentError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Full cause chain of an anyhow error, on one line
    pub(crate) fn chain(err: &anyhow::Error) -> String {
        format!("{:#}", err)
    }

    pub(crate) fn retrieval(err: anyhow::Error) -> Self {
        Self::Retrieval(Self::chain(&err))
    }

    pub(crate) fn llm(err: anyhow::Error) -> Self {
        Self::Llm(Self::chain(&err))
    }

    pub(crate) fn processing(err: anyhow::Error) -> Self {
        Self::Processing(Self::chain(&err))
    }

    pub(crate) fn speech(err: anyhow::Error) -> Self {
        Self::Speech(Self::chain(&err))
    }
}
