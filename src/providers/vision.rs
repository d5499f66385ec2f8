//! Optical text recognition through a vision-capable LLM.
//!
//! * Single images are sent to the model directly ([`OcrProvider::detect_text`]).
//! * PDFs become background jobs ([`OcrProvider::submit_job`]): the document
//!   is rasterised with pdfium, every page is PNG-encoded and transcribed in
//!   order, and the outcome is recorded in an in-process [`OcrJobTable`] that
//!   [`OcrProvider::poll_job`] reads.
//!
//! Images travel as base64 data inside the JSON request body with
//! `detail: "high"`, which lets GPT-4-class models use their full tile budget
//! so small print survives.

use crate::error::{PipelineError, ProviderError};
use crate::pipeline::extract::SourceArtifact;
use crate::prompts::TRANSCRIPTION_SYSTEM_PROMPT;
use crate::providers::llm::{clean_response, resolve_provider, ProviderSelection};
use crate::providers::render::{render_all_pages, DEFAULT_MAX_PIXELS};
use crate::providers::{OcrJob, OcrJobStatus, OcrProvider};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

const PROVIDER: &str = "vision-ocr";

/// One background job: its last known state and the task computing it.
#[derive(Debug)]
struct JobEntry {
    job: OcrJob,
    task: Option<AbortHandle>,
}

/// In-process record of background OCR jobs.
///
/// An entry lives from [`start`](Self::start) until it is read in a terminal
/// state by [`poll`](Self::poll) or dropped by [`cancel`](Self::cancel).
#[derive(Debug, Clone, Default)]
pub struct OcrJobTable {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl OcrJobTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new in-progress job and return its id.
    pub fn start(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock().insert(
            id.clone(),
            JobEntry {
                job: OcrJob::in_progress(),
                task: None,
            },
        );
        id
    }

    /// Remember the task working on `id` so it can be aborted.
    pub fn attach(&self, id: &str, task: AbortHandle) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.task = Some(task);
        }
    }

    /// Record the outcome of `id`. Ignored once the job was cancelled.
    pub fn finish(&self, id: &str, outcome: OcrJob) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.job = outcome;
            entry.task = None;
        }
    }

    /// Current state of `id`; a terminal state is handed out once and the
    /// entry removed.
    pub fn poll(&self, id: &str) -> Option<OcrJob> {
        let mut jobs = self.lock();
        let terminal = jobs.get(id)?.job.status != OcrJobStatus::InProgress;
        if terminal {
            jobs.remove(id).map(|entry| entry.job)
        } else {
            jobs.get(id).map(|entry| entry.job.clone())
        }
    }

    /// Drop `id` and abort its task. Returns whether the job was known.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().remove(id) {
            Some(entry) => {
                if let Some(task) = entry.task {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// [`OcrProvider`] backed by a vision LLM.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    max_pixels: u32,
    jobs: OcrJobTable,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_pixels: DEFAULT_MAX_PIXELS,
            jobs: OcrJobTable::default(),
        }
    }

    /// Resolve a provider with [`resolve_provider`] and wrap it.
    pub fn from_selection(selection: &ProviderSelection) -> Result<Self, PipelineError> {
        Ok(Self::new(resolve_provider(selection)?))
    }

    /// Longest-edge pixel cap for rendered PDF pages.
    pub fn with_max_pixels(mut self, max_pixels: u32) -> Self {
        self.max_pixels = max_pixels.max(1);
        self
    }
}

/// Send one image to the model and return its transcribed lines.
async fn transcribe(
    provider: &Arc<dyn LLMProvider>,
    image: ImageData,
) -> Result<Vec<String>, ProviderError> {
    let messages = vec![
        ChatMessage::system(TRANSCRIPTION_SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = CompletionOptions {
        temperature: Some(0.0),
        max_tokens: Some(4096),
        ..Default::default()
    };

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| ProviderError::api(PROVIDER, e.to_string()))?;
    debug!(
        "Transcription: {} input tokens, {} output tokens",
        response.prompt_tokens, response.completion_tokens
    );

    Ok(split_lines(&clean_response(&response.content)))
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wrap already-encoded image bytes, detecting the format from magic bytes.
fn encode_image_bytes(bytes: &[u8]) -> Result<ImageData, ProviderError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ProviderError::invalid_response(PROVIDER, format!("unrecognised image: {e}")))?;
    Ok(ImageData::new(STANDARD.encode(bytes), format.to_mime_type()).with_detail("high"))
}

/// PNG-encode a rendered page. PNG is lossless; JPEG artefacts around glyphs
/// degrade recognition.
fn encode_page(img: &DynamicImage) -> Result<ImageData, ProviderError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ProviderError::invalid_response(PROVIDER, format!("PNG encoding: {e}")))?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Rasterise and transcribe a whole PDF.
async fn transcribe_document(
    provider: Arc<dyn LLMProvider>,
    bytes: Vec<u8>,
    max_pixels: u32,
) -> Result<Vec<String>, ProviderError> {
    // pdfium opens documents from a filesystem path.
    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| ProviderError::transport(PROVIDER, format!("temp file: {e}")))?;
    file.write_all(&bytes)
        .map_err(|e| ProviderError::transport(PROVIDER, format!("temp file: {e}")))?;

    let pages = render_all_pages(file.path(), max_pixels).await?;
    let total = pages.len();
    let mut lines = Vec::new();
    for (idx, page) in pages.iter().enumerate() {
        let image = encode_page(page)?;
        let page_lines = transcribe(&provider, image).await?;
        debug!("Page {}/{}: {} line(s)", idx + 1, total, page_lines.len());
        lines.extend(page_lines);
    }
    Ok(lines)
}

#[async_trait]
impl OcrProvider for VisionOcr {
    async fn detect_text(&self, source: &SourceArtifact) -> Result<Vec<String>, ProviderError> {
        let image = encode_image_bytes(&source.bytes)?;
        transcribe(&self.provider, image).await
    }

    async fn submit_job(&self, source: &SourceArtifact) -> Result<String, ProviderError> {
        if !is_pdf(&source.bytes) {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                format!("'{}' is not a PDF (missing %PDF header)", source.key),
            ));
        }

        let job_id = self.jobs.start();
        let jobs = self.jobs.clone();
        let provider = Arc::clone(&self.provider);
        let bytes = source.bytes.clone();
        let max_pixels = self.max_pixels;
        let id = job_id.clone();

        let task = tokio::spawn(async move {
            let outcome = match transcribe_document(provider, bytes, max_pixels).await {
                Ok(lines) => {
                    info!("OCR job {} finished: {} line(s)", id, lines.len());
                    OcrJob::succeeded(lines)
                }
                Err(e) => {
                    warn!("OCR job {} failed: {}", id, e);
                    OcrJob::failed(e.to_string())
                }
            };
            jobs.finish(&id, outcome);
        });
        self.jobs.attach(&job_id, task.abort_handle());

        Ok(job_id)
    }

    async fn poll_job(&self, job_id: &str) -> Result<OcrJob, ProviderError> {
        self.jobs
            .poll(job_id)
            .ok_or_else(|| ProviderError::UnknownReference {
                provider: PROVIDER.to_string(),
                reference: job_id.to_string(),
            })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        if self.jobs.cancel(job_id) {
            info!("OCR job {} cancelled", job_id);
        }
        Ok(())
    }
}
