//! Input resolution for the CLI: a local path or an HTTP(S) URL → bytes.
//!
//! Unlike a rendering tool, nothing downstream needs a filesystem path: the
//! bytes are copied into the source store under the returned file name.

use crate::error::PipelineError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A user-supplied input, loaded into memory.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    /// Last path segment, used as the source key inside the store.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` from disk or over HTTP.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, PipelineError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<LoadedInput, PipelineError> {
    let path = Path::new(path_str);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::storage(path_str, e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| PipelineError::storage(path_str, "path has no file name"))?;

    debug!("Loaded local input: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedInput { file_name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, PipelineError> {
    info!("Downloading from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::storage(url, e))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::storage(url, format!("download timed out after {timeout_secs}s"))
        } else {
            PipelineError::storage(url, e)
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::storage(
            url,
            format!("HTTP {}", response.status()),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::storage(url, e))?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(LoadedInput {
        file_name: file_name_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment with an extension, or `"downloaded.bin"`.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.bin".to_string()
}
