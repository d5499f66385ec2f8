//! Job orchestration: extract → translate → synthesize → persist.
//!
//! [`Pipeline`] is the only component with side effects on job state. A job
//! moves `pending → processing → done | error`; every stage error is caught
//! here exactly once and recorded as the job's terminal `error` state with a
//! human-readable message plus a stable [`PipelineError::kind`] code.
//!
//! Output artifacts are written only after all three stages have succeeded,
//! so a failed job leaves nothing behind.

use crate::clock::{Clock, TokioClock};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::job::{Job, JobStatus, JobStore, JobUpdate};
use crate::pipeline::chunk::chunk_count;
use crate::pipeline::extract::{SourceArtifact, SourceKind, TextExtractor};
use crate::pipeline::synthesize::SpeechSynthesizer;
use crate::pipeline::translate::Translator;
use crate::progress::Stage;
use crate::providers::Capabilities;
use crate::storage::{ArtifactKeys, ObjectMeta, ObjectStore, TARGET_LANG_TAG};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Where sources are read from and outputs are written to.
#[derive(Clone)]
pub struct Stores {
    pub source: Arc<dyn ObjectStore>,
    /// Destination for extracted and translated text.
    pub text: Arc<dyn ObjectStore>,
    pub audio: Arc<dyn ObjectStore>,
}

impl Stores {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        text: Arc<dyn ObjectStore>,
        audio: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            source,
            text,
            audio,
        }
    }

    /// One store for sources and all outputs.
    pub fn single(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            source: Arc::clone(&store),
            text: Arc::clone(&store),
            audio: store,
        }
    }
}

/// Size and timing figures for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub extracted_chars: usize,
    pub translated_chars: usize,
    pub translation_chunks: usize,
    pub synthesis_chunks: usize,
    pub audio_bytes: usize,
    pub extract_ms: u64,
    pub translate_ms: u64,
    pub synthesize_ms: u64,
    pub persist_ms: u64,
    pub total_ms: u64,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    /// `done` or `error`.
    pub status: JobStatus,
    /// Key of the narration in the audio store, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    /// Human-readable failure message, on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine-readable code for `error` (see [`PipelineError::kind`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub stats: PipelineStats,
}

impl JobResult {
    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

/// The document-to-audio pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    capabilities: Capabilities,
    stores: Stores,
    jobs: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        capabilities: Capabilities,
        stores: Stores,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            config,
            capabilities,
            stores,
            jobs,
            clock: Arc::new(TokioClock),
        }
    }

    /// Replace the clock used for extraction polling and job timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Record a new `pending` job for `source_key`.
    pub async fn ingest(&self, source_key: &str, target_lang: &str) -> Result<Job, PipelineError> {
        let target_lang = target_lang.trim();
        if target_lang.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "target language must not be empty".to_string(),
            ));
        }
        let job = Job::new(source_key, target_lang, self.clock.now());
        self.jobs.create(&job).await?;
        info!(
            "Job {} created for '{}' → '{}'",
            job.id, job.source_key, job.target_lang
        );
        Ok(job)
    }

    /// Ingest and run `source_key`, taking the target language from the
    /// source's `target_lang` tag (or the configured default).
    pub async fn submit(&self, source_key: &str) -> Result<JobResult, PipelineError> {
        let tagged = match self.stores.source.head(source_key).await {
            Ok(meta) => meta.target_lang().map(str::to_string),
            Err(e) => {
                // The run records the storage failure on the job.
                debug!("No metadata for '{}': {}", source_key, e);
                None
            }
        };
        let target_lang = tagged.unwrap_or_else(|| self.config.default_target_lang.clone());
        let job = self.ingest(source_key, &target_lang).await?;
        self.run(&job.id, &job.source_key, &job.target_lang).await
    }

    /// Look up a job record.
    pub async fn job(&self, job_id: &str) -> Result<Job, PipelineError> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound {
                id: job_id.to_string(),
            })
    }

    /// Run job `job_id` to a terminal state.
    ///
    /// Stage failures are reported through the returned [`JobResult`]
    /// (`status == Error`).
    ///
    /// # Errors
    /// Only when the job store cannot record a status change.
    pub async fn run(
        &self,
        job_id: &str,
        source_key: &str,
        target_lang: &str,
    ) -> Result<JobResult, PipelineError> {
        let total_start = Instant::now();
        self.jobs.update(job_id, JobUpdate::Processing).await?;
        info!("Job {} processing '{}' → '{}'", job_id, source_key, target_lang);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(job_id, source_key);
        }

        let mut stats = PipelineStats::default();
        let outcome = self.execute(source_key, target_lang, &mut stats).await;
        stats.total_ms = total_start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(audio_key) => {
                self.jobs
                    .update(
                        job_id,
                        JobUpdate::Done {
                            audio_key: audio_key.clone(),
                        },
                    )
                    .await?;
                info!(
                    "Job {} done in {}ms: {} ({} bytes)",
                    job_id, stats.total_ms, audio_key, stats.audio_bytes
                );
                JobResult {
                    job_id: job_id.to_string(),
                    status: JobStatus::Done,
                    audio_key: Some(audio_key),
                    error: None,
                    error_kind: None,
                    stats,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Job {} failed [{}]: {}", job_id, e.kind(), message);
                self.jobs
                    .update(
                        job_id,
                        JobUpdate::Failed {
                            message: message.clone(),
                        },
                    )
                    .await?;
                JobResult {
                    job_id: job_id.to_string(),
                    status: JobStatus::Error,
                    audio_key: None,
                    error: Some(message),
                    error_kind: Some(e.kind().to_string()),
                    stats,
                }
            }
        };

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(job_id, result.status, result.error.clone());
        }
        Ok(result)
    }

    fn stage_start(&self, stage: Stage) {
        debug!("Stage {} started", stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    /// Steps 2–6 of a run; returns the audio key.
    async fn execute(
        &self,
        source_key: &str,
        target_lang: &str,
        stats: &mut PipelineStats,
    ) -> Result<String, PipelineError> {
        // ── Extract ──────────────────────────────────────────────────────
        self.stage_start(Stage::Extract);
        let started = Instant::now();
        let meta = self.stores.source.head(source_key).await?;
        let kind = SourceKind::detect(source_key, Some(&meta))?;
        let bytes = self.stores.source.get(source_key).await?;
        let source = SourceArtifact::new(source_key, kind, meta.content_type, bytes);

        let extractor = TextExtractor::new(
            Arc::clone(&self.capabilities.ocr),
            Arc::clone(&self.clock),
            self.config.poll,
        );
        let extracted = extractor.extract(&source).await?;
        stats.extracted_chars = extracted.chars().count();
        stats.extract_ms = started.elapsed().as_millis() as u64;

        // ── Translate ────────────────────────────────────────────────────
        self.stage_start(Stage::Translate);
        let started = Instant::now();
        let translator = Translator::new(
            Arc::clone(&self.capabilities.translation),
            self.config.translate_char_limit,
        )
        .with_progress(self.config.progress_callback.clone());
        let translated = translator.translate_long(&extracted, target_lang).await?;
        stats.translation_chunks = chunk_count(&extracted, self.config.translate_char_limit);
        stats.translated_chars = translated.chars().count();
        stats.translate_ms = started.elapsed().as_millis() as u64;

        // ── Synthesize ───────────────────────────────────────────────────
        self.stage_start(Stage::Synthesize);
        let started = Instant::now();
        let synthesizer = SpeechSynthesizer::new(
            Arc::clone(&self.capabilities.speech),
            self.config.voices.clone(),
            self.config.synthesis_char_limit,
        )
        .with_progress(self.config.progress_callback.clone());
        let audio = synthesizer.synthesize(&translated, target_lang).await?;
        stats.synthesis_chunks = chunk_count(&translated, self.config.synthesis_char_limit);
        stats.audio_bytes = audio.len();
        stats.synthesize_ms = started.elapsed().as_millis() as u64;

        // ── Persist ──────────────────────────────────────────────────────
        self.stage_start(Stage::Persist);
        let started = Instant::now();
        let keys = ArtifactKeys::for_source(source_key, target_lang);
        let text_meta =
            ObjectMeta::new(TEXT_CONTENT_TYPE).with_tag(TARGET_LANG_TAG, target_lang);

        self.stores
            .text
            .put(&keys.extracted, extracted.into_bytes(), text_meta.clone())
            .await?;
        self.stores
            .text
            .put(&keys.translated, translated.into_bytes(), text_meta)
            .await?;
        self.stores
            .audio
            .put(
                &keys.audio,
                audio,
                ObjectMeta::new(AUDIO_CONTENT_TYPE).with_tag(TARGET_LANG_TAG, target_lang),
            )
            .await?;
        stats.persist_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Persisted {}, {}, {}",
            keys.extracted, keys.translated, keys.audio
        );

        Ok(keys.audio)
    }
}
