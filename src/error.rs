//! Error types for the book2audio library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`ProviderError`] — raised by an injected capability (OCR, translation,
//!   speech, storage backend). It knows nothing about pipeline stages.
//!
//! * [`PipelineError`] — the stage-level taxonomy. Each stage converts a
//!   `ProviderError` into exactly one `PipelineError` variant, and the
//!   orchestrator turns any `PipelineError` into a terminal `error` job state.
//!
//! Callers of [`crate::Pipeline::run`] only ever see a `PipelineError` as an
//! `Err` when the job store itself is unreachable; every other failure lands in
//! the returned [`crate::JobResult`].

use thiserror::Error;

/// All stage-level errors produced by the conversion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// No extraction strategy is registered for the source type.
    #[error("Unsupported file type: '{extension}' (source '{source_key}')")]
    UnsupportedFormat {
        source_key: String,
        extension: String,
    },

    /// Extraction succeeded but produced only whitespace.
    #[error("No text extracted from '{source_key}'")]
    EmptyExtraction { source_key: String },

    /// The OCR capability reported a failure.
    #[error("Text extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// An asynchronous OCR job did not reach a terminal state in time.
    #[error("Text extraction timed out after {waited_secs}s without a terminal job status")]
    ExtractionTimeout { waited_secs: u64 },

    // ── Translation / synthesis ───────────────────────────────────────────
    /// Translating one chunk failed; the whole text is abandoned.
    #[error("Translation failed on chunk {chunk}: {detail}")]
    TranslationFailed { chunk: usize, detail: String },

    /// Synthesising one chunk failed; no partial audio is returned.
    #[error("Speech synthesis failed on chunk {chunk}: {detail}")]
    SynthesisFailed { chunk: usize, detail: String },

    // ── Collaborators ─────────────────────────────────────────────────────
    /// Object storage or job store could not be read or written.
    #[error("Storage failure for '{key}': {detail}")]
    StorageFailure { key: String, detail: String },

    /// The job store has no record with this id.
    #[error("Job '{id}' not found")]
    JobNotFound { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A capability provider could not be constructed (missing API key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code for this error, recorded next to the
    /// human-readable message on failed jobs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat { .. } => "unsupported_format",
            PipelineError::EmptyExtraction { .. } => "empty_extraction",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::ExtractionTimeout { .. } => "extraction_timeout",
            PipelineError::TranslationFailed { .. } => "translation_failed",
            PipelineError::SynthesisFailed { .. } => "synthesis_failed",
            PipelineError::StorageFailure { .. } => "storage_failure",
            PipelineError::JobNotFound { .. } => "job_not_found",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::ProviderNotConfigured { .. } => "provider_not_configured",
            PipelineError::Internal(_) => "internal",
        }
    }

    pub(crate) fn storage(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PipelineError::StorageFailure {
            key: key.into(),
            detail: err.to_string(),
        }
    }
}

/// An error raised by an injected capability provider.
///
/// Providers only describe *what* went wrong; the calling stage decides which
/// [`PipelineError`] variant it becomes.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ProviderError {
    /// The remote service answered with an error.
    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    /// The request never completed (connection, DNS, TLS).
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// The service answered but the payload was unusable.
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// The provider does not know the referenced job or object.
    #[error("{provider}: unknown reference '{reference}'")]
    UnknownReference { provider: String, reference: String },
}

impl ProviderError {
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = PipelineError::UnsupportedFormat {
            source_key: "book.docx".into(),
            extension: ".docx".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Unsupported file type"), "got: {msg}");
        assert!(msg.contains(".docx"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = PipelineError::ExtractionTimeout { waited_secs: 60 };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn chunk_index_in_display() {
        let e = PipelineError::TranslationFailed {
            chunk: 3,
            detail: "throttled".into(),
        };
        assert!(e.to_string().contains("chunk 3"));
        assert!(e.to_string().contains("throttled"));
    }

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(
            PipelineError::EmptyExtraction {
                source_key: "a.txt".into()
            }
            .kind(),
            "empty_extraction"
        );
        assert_eq!(
            PipelineError::SynthesisFailed {
                chunk: 0,
                detail: String::new()
            }
            .kind(),
            "synthesis_failed"
        );
    }

    #[test]
    fn provider_error_display() {
        let e = ProviderError::api("translate", "quota exceeded");
        assert_eq!(e.to_string(), "translate API error: quota exceeded");
    }
}
