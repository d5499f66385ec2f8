//! Object storage collaborator and derived-artifact naming.
//!
//! The pipeline reads source artifacts from one [`ObjectStore`] and writes
//! its three outputs (extracted text, translated text, audio) to others. Keys
//! are opaque strings; `/` in a key is only meaningful to backends that map
//! keys onto a hierarchy, such as [`FsStore`].

use crate::error::PipelineError;
use crate::job::write_atomic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Metadata tag carrying the requested narration language.
pub const TARGET_LANG_TAG: &str = "target_lang";

/// Content type and free-form tags stored alongside an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The `target_lang` tag, if present and non-empty.
    pub fn target_lang(&self) -> Option<&str> {
        self.tags
            .get(TARGET_LANG_TAG)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Durable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;

    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError>;

    async fn put(&self, key: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), PipelineError>;
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Object store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, ObjectMeta)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, ObjectMeta)>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.lock()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| PipelineError::storage(key, "no such object"))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError> {
        self.lock()
            .get(key)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| PipelineError::storage(key, "no such object"))
    }

    async fn put(&self, key: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), PipelineError> {
        self.lock().insert(key.to_string(), (data, meta));
        Ok(())
    }
}

// ── Filesystem store ─────────────────────────────────────────────────────────

/// Object store rooted at a directory.
///
/// Object bytes live at `<root>/<key>`; metadata lives in a
/// `<root>/<key>.meta.json` sidecar. Keys containing `..` or absolute
/// components are rejected.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, PipelineError> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(PipelineError::storage(key, "key escapes the store root"));
        }
        Ok(self.root.join(rel))
    }

    fn meta_path_for(&self, key: &str) -> Result<PathBuf, PipelineError> {
        let mut p = self.path_for(key)?.into_os_string();
        p.push(".meta.json");
        Ok(PathBuf::from(p))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::storage(key, e))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, PipelineError> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PipelineError::storage(key, "no such object"));
        }
        let meta_path = self.meta_path_for(key)?;
        match tokio::fs::read(&meta_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| PipelineError::storage(key, e)),
            // Objects copied in by hand have no sidecar.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ObjectMeta::new(content_type_for_key(key)))
            }
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        let meta_path = self.meta_path_for(key)?;
        let meta_json =
            serde_json::to_vec_pretty(&meta).map_err(|e| PipelineError::storage(key, e))?;

        write_atomic(&path, &data)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        write_atomic(&meta_path, &meta_json)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;

        debug!("Stored {} ({} bytes) at {}", key, data.len(), path.display());
        Ok(())
    }
}

/// Best-effort content type from a key's extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    match extension_of(key).as_str() {
        ".txt" => "text/plain",
        ".rtf" => "application/rtf",
        ".pdf" => "application/pdf",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Lower-cased extension of the last path segment, including the dot
/// (`"Book.PDF"` → `".pdf"`). Empty when there is none.
pub fn extension_of(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(i) if i > 0 => name[i..].to_lowercase(),
        _ => String::new(),
    }
}

/// `key` without the extension of its last path segment (same rule as
/// [`extension_of`]); dots in directory names are kept.
fn strip_extension(key: &str) -> &str {
    let name_start = key.rfind('/').map_or(0, |i| i + 1);
    match key[name_start..].rfind('.') {
        Some(i) if i > 0 => &key[..name_start + i],
        _ => key,
    }
}

// ── Derived artifact keys ────────────────────────────────────────────────────

/// Destination keys for the three outputs of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactKeys {
    /// `extracted/{source_key}_extracted.txt`
    pub extracted: String,
    /// `translated/{source_key}_{lang}_translated.txt`
    pub translated: String,
    /// `{source_key_without_ext}_{lang}.mp3`
    pub audio: String,
}

impl ArtifactKeys {
    pub fn for_source(source_key: &str, target_lang: &str) -> Self {
        let stem = strip_extension(source_key);
        Self {
            extracted: format!("extracted/{source_key}_extracted.txt"),
            translated: format!("translated/{source_key}_{target_lang}_translated.txt"),
            audio: format!("{stem}_{target_lang}.mp3"),
        }
    }
}
