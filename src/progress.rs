//! Progress-callback trait for per-stage and per-chunk pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a job moves through extraction, translation, synthesis and
//! persistence.
//!
//! # Example
//!
//! ```rust
//! use book2audio::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ChunkCounter {
//!     chunks: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for ChunkCounter {
//!     fn on_chunk_complete(&self, _stage: Stage, _index: usize, _total: usize) {
//!         self.chunks.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(ChunkCounter { chunks: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The pipeline stage an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Translate,
    Synthesize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Translate => "translate",
            Stage::Synthesize => "synthesize",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as a job progresses.
///
/// Implementations must be `Send + Sync`: several jobs may share one config
/// and run on different tasks. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a job leaves `pending`.
    fn on_job_start(&self, job_id: &str, source_key: &str) {
        let _ = (job_id, source_key);
    }

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each chunk of a chunked stage.
    ///
    /// # Arguments
    /// * `stage` — [`Stage::Translate`] or [`Stage::Synthesize`]
    /// * `index` — zero-based chunk index
    /// * `total` — number of chunks in this stage
    fn on_chunk_complete(&self, stage: Stage, index: usize, total: usize) {
        let _ = (stage, index, total);
    }

    /// Called once the job reached a terminal state.
    ///
    /// `error` is the human-readable failure message for `JobStatus::Error`.
    fn on_job_complete(&self, job_id: &str, status: JobStatus, error: Option<String>) {
        let _ = (job_id, status, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        chunks: AtomicUsize,
        finished: Mutex<Option<(JobStatus, Option<String>)>>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_chunk_complete(&self, _stage: Stage, _index: usize, _total: usize) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _job_id: &str, status: JobStatus, error: Option<String>) {
            *self.finished.lock().unwrap() = Some((status, error));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start("j", "a.txt");
        cb.on_stage_start(Stage::Extract);
        cb.on_chunk_complete(Stage::Translate, 0, 1);
        cb.on_job_complete("j", JobStatus::Done, None);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_start(Stage::Extract);
        tracker.on_stage_start(Stage::Translate);
        tracker.on_chunk_complete(Stage::Translate, 0, 2);
        tracker.on_chunk_complete(Stage::Translate, 1, 2);
        tracker.on_job_complete("j", JobStatus::Error, Some("boom".into()));

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Extract, Stage::Translate]
        );
        assert_eq!(tracker.chunks.load(Ordering::SeqCst), 2);
        assert_eq!(
            *tracker.finished.lock().unwrap(),
            Some((JobStatus::Error, Some("boom".to_string())))
        );
    }

    #[tokio::test]
    async fn arc_dyn_callback_moves_into_spawn() {
        let cb: Arc<dyn PipelineProgressCallback> = Arc::new(NoopProgressCallback);
        tokio::spawn(async move {
            cb.on_job_complete("j", JobStatus::Done, None);
        })
        .await
        .expect("spawn must succeed");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Synthesize.to_string(), "synthesize");
    }
}
