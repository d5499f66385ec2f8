//! # book2audio
//!
//! Turn books (plain text, RTF, scanned images, PDFs) into translated audio
//! narrations.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source artifact
//!  │
//!  ├─ 1. Extract     decode text, strip RTF markup, or OCR images / PDFs
//!  ├─ 2. Translate   paragraph-preserving chunks below 4,500 chars
//!  ├─ 3. Synthesize  chunks below 3,000 chars → MP3 segments → one stream
//!  └─ 4. Persist     extracted text, translated text, narration
//! ```
//!
//! Every stage talks to its backend through an injected capability trait
//! ([`OcrProvider`], [`TranslationProvider`], [`SpeechProvider`]), and the
//! [`Pipeline`] records each job's `pending → processing → done | error`
//! lifecycle in a [`JobStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use book2audio::providers::{llm, speech, vision};
//! use book2audio::{Capabilities, FsStore, MemoryJobStore, Pipeline, PipelineConfig, Stores};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLM auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let selection = llm::ProviderSelection::default();
//!     let capabilities = Capabilities::new(
//!         Arc::new(vision::VisionOcr::from_selection(&selection)?),
//!         Arc::new(llm::LlmTranslator::from_selection(&selection)?),
//!         Arc::new(speech::HttpSpeech::from_env(None, None)?),
//!     );
//!     let pipeline = Pipeline::new(
//!         PipelineConfig::default(),
//!         capabilities,
//!         Stores::single(Arc::new(FsStore::new("library"))),
//!         Arc::new(MemoryJobStore::new()),
//!     );
//!
//!     let job = pipeline.ingest("moby-dick.txt", "es").await?;
//!     let result = pipeline.run(&job.id, &job.source_key, &job.target_lang).await?;
//!     println!("{:?} {:?}", result.status, result.audio_key);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `book2audio` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! book2audio = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod storage;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use clock::{Clock, TokioClock};
pub use config::{PipelineConfig, PipelineConfigBuilder, PollSettings, VoiceProfile};
pub use error::{PipelineError, ProviderError};
pub use job::{FileJobStore, Job, JobStatus, JobStore, JobUpdate, MemoryJobStore};
pub use orchestrator::{JobResult, Pipeline, PipelineStats, Stores};
pub use pipeline::chunk::{split, TextChunk};
pub use pipeline::extract::{SourceArtifact, SourceKind, TextExtractor};
pub use pipeline::synthesize::SpeechSynthesizer;
pub use pipeline::translate::Translator;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use providers::{
    Capabilities, OcrJob, OcrJobStatus, OcrProvider, SpeechProvider, TranslationProvider,
};
pub use storage::{ArtifactKeys, FsStore, MemoryStore, ObjectMeta, ObjectStore};
pub use upload::{UploadAuthorizer, UploadGrant};
