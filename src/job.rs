//! Job records and the job-status store collaborator.
//!
//! A [`Job`] is created `pending` at ingestion and mutated exactly twice by
//! the orchestrator: to `processing`, then to `done` or `error`. Each mutation
//! is a single [`JobUpdate`] applied atomically by the store, so readers never
//! observe a status without its companion field (audio key or error message).

use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// `done` and `error` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One end-to-end request to convert a source artifact to audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_key: String,
    pub target_lang: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A fresh `pending` job with a random v4 id.
    pub fn new(
        source_key: impl Into<String>,
        target_lang: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_key: source_key.into(),
            target_lang: target_lang.into(),
            status: JobStatus::Pending,
            created_at,
            audio_key: None,
            error: None,
        }
    }

    /// Apply `update` in place.
    pub fn apply(&mut self, update: &JobUpdate) {
        match update {
            JobUpdate::Processing => self.status = JobStatus::Processing,
            JobUpdate::Done { audio_key } => {
                self.status = JobStatus::Done;
                self.audio_key = Some(audio_key.clone());
            }
            JobUpdate::Failed { message } => {
                self.status = JobStatus::Error;
                self.error = Some(message.clone());
            }
        }
    }
}

/// A status change together with the fields that must change with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobUpdate {
    Processing,
    Done { audio_key: String },
    Failed { message: String },
}

/// The job-status record store.
///
/// Keyed by job id; last write wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), PipelineError>;

    /// Atomically apply `update` to the stored job.
    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), PipelineError>;

    async fn get(&self, id: &str) -> Result<Option<Job>, PipelineError>;
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Job store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of every stored job, sorted by creation time.
    pub fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.lock().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), PipelineError> {
        self.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), PipelineError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::JobNotFound { id: id.to_string() })?;
        job.apply(&update);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, PipelineError> {
        Ok(self.lock().get(id).cloned())
    }
}

// ── File-backed store ────────────────────────────────────────────────────────

/// Job store writing one JSON document per job into a directory.
///
/// Every write goes to a temp file first and is renamed into place, so a
/// reader sees either the previous record or the new one, never a torn file.
#[derive(Debug)]
pub struct FileJobStore {
    root: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn write(&self, job: &Job) -> Result<(), PipelineError> {
        let path = self.path_for(&job.id);
        let json = serde_json::to_vec_pretty(job)
            .map_err(|e| PipelineError::Internal(format!("serialise job: {e}")))?;
        write_atomic(&path, &json)
            .await
            .map_err(|e| PipelineError::storage(path.display().to_string(), e))
    }

    async fn read(&self, id: &str) -> Result<Option<Job>, PipelineError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PipelineError::storage(path.display().to_string(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::storage(path.display().to_string(), e)),
        }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<(), PipelineError> {
        let _guard = self.write_lock.lock().await;
        self.write(job).await?;
        debug!("Created job record {}", job.id);
        Ok(())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), PipelineError> {
        let _guard = self.write_lock.lock().await;
        let mut job = self
            .read(id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound { id: id.to_string() })?;
        job.apply(&update);
        self.write(&job).await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, PipelineError> {
        self.read(id).await
    }
}

/// Write `data` to `path` via a sibling temp file and rename.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}
