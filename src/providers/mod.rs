//! Capability providers injected into the pipeline stages.
//!
//! Each stage depends on exactly one trait here rather than on a concrete
//! service client, so tests substitute fakes and deployments pick whichever
//! backend they have credentials for.
//!
//! | Trait | Used by | Shipped implementation |
//! |-------|---------|------------------------|
//! | [`OcrProvider`] | [`crate::pipeline::extract`] | [`vision::VisionOcr`] |
//! | [`TranslationProvider`] | [`crate::pipeline::translate`] | [`llm::LlmTranslator`] |
//! | [`SpeechProvider`] | [`crate::pipeline::synthesize`] | [`speech::HttpSpeech`] |

use crate::error::ProviderError;
use crate::pipeline::extract::SourceArtifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod llm;
pub mod render;
pub mod speech;
pub mod vision;

/// State of an asynchronous OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcrJobStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Snapshot returned by [`OcrProvider::poll_job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrJob {
    pub status: OcrJobStatus,
    /// Recognised text lines, in reading order. Only meaningful on success.
    #[serde(default)]
    pub lines: Vec<String>,
    /// Provider-supplied failure reason.
    #[serde(default)]
    pub message: Option<String>,
}

impl OcrJob {
    pub fn in_progress() -> Self {
        Self {
            status: OcrJobStatus::InProgress,
            lines: Vec::new(),
            message: None,
        }
    }

    pub fn succeeded(lines: Vec<String>) -> Self {
        Self {
            status: OcrJobStatus::Succeeded,
            lines,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OcrJobStatus::Failed,
            lines: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Optical text recognition.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Recognise a single image synchronously, returning its text lines.
    async fn detect_text(&self, source: &SourceArtifact) -> Result<Vec<String>, ProviderError>;

    /// Start recognition of a (possibly multi-page) document; returns a job id.
    async fn submit_job(&self, source: &SourceArtifact) -> Result<String, ProviderError>;

    /// Current state of a job started with [`OcrProvider::submit_job`].
    async fn poll_job(&self, job_id: &str) -> Result<OcrJob, ProviderError>;

    /// Stop a job the caller has given up on. Backends without
    /// cancellation keep the default no-op.
    async fn cancel_job(&self, _job_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Machine translation.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate `text` from `source_lang` (`"auto"` to detect) into `target_lang`.
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text` with `voice_id`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ProviderError>;
}

/// The full set of capabilities a pipeline needs.
#[derive(Clone)]
pub struct Capabilities {
    pub ocr: Arc<dyn OcrProvider>,
    pub translation: Arc<dyn TranslationProvider>,
    pub speech: Arc<dyn SpeechProvider>,
}

impl Capabilities {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        translation: Arc<dyn TranslationProvider>,
        speech: Arc<dyn SpeechProvider>,
    ) -> Self {
        Self {
            ocr,
            translation,
            speech,
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("ocr", &"<dyn OcrProvider>")
            .field("translation", &"<dyn TranslationProvider>")
            .field("speech", &"<dyn SpeechProvider>")
            .finish()
    }
}
