//! Text extraction: source artifact → normalised plain text.
//!
//! Three source families are supported, chosen from the object's extension
//! (falling back to its content type):
//!
//! | Kind | Extensions | Strategy |
//! |------|------------|----------|
//! | [`SourceKind::PlainText`] | `.txt` | decode bytes (invalid UTF-8 dropped) |
//! | [`SourceKind::Markup`] | `.rtf` | decode, then strip RTF control syntax |
//! | [`SourceKind::OpticalImage`] | `.png` `.jpg` `.jpeg` | synchronous OCR |
//! | [`SourceKind::OpticalDocument`] | `.pdf` | asynchronous OCR job, bounded polling |
//!
//! Plain text keeps its line breaks so the chunker can respect paragraphs.
//! Markup and OCR output come back as a single whitespace-collapsed line.

use crate::clock::Clock;
use crate::config::PollSettings;
use crate::error::PipelineError;
use crate::providers::{OcrJobStatus, OcrProvider};
use crate::storage::{extension_of, ObjectMeta};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Declared media family of a source artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PlainText,
    Markup,
    OpticalImage,
    OpticalDocument,
}

impl SourceKind {
    /// Kind for a lower-cased extension including the dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".txt" => Some(SourceKind::PlainText),
            ".rtf" => Some(SourceKind::Markup),
            ".png" | ".jpg" | ".jpeg" => Some(SourceKind::OpticalImage),
            ".pdf" => Some(SourceKind::OpticalDocument),
            _ => None,
        }
    }

    /// Kind for a MIME type; parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" => Some(SourceKind::PlainText),
            "application/rtf" | "text/rtf" => Some(SourceKind::Markup),
            "image/png" | "image/jpeg" => Some(SourceKind::OpticalImage),
            "application/pdf" => Some(SourceKind::OpticalDocument),
            _ => None,
        }
    }

    /// Determine the kind of `key`: extension first, then content type.
    pub fn detect(key: &str, meta: Option<&ObjectMeta>) -> Result<Self, PipelineError> {
        let ext = extension_of(key);
        if let Some(kind) = Self::from_extension(&ext) {
            return Ok(kind);
        }
        if let Some(kind) = meta.and_then(|m| Self::from_content_type(&m.content_type)) {
            debug!("Source '{}' typed from content type as {:?}", key, kind);
            return Ok(kind);
        }
        Err(PipelineError::UnsupportedFormat {
            source_key: key.to_string(),
            extension: if ext.is_empty() { "<none>".to_string() } else { ext },
        })
    }

    pub fn is_optical(self) -> bool {
        matches!(self, SourceKind::OpticalImage | SourceKind::OpticalDocument)
    }
}

/// Immutable source content handed to the extractor.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    pub key: String,
    pub kind: SourceKind,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SourceArtifact {
    pub fn new(
        key: impl Into<String>,
        kind: SourceKind,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Turns a [`SourceArtifact`] into plain text.
pub struct TextExtractor {
    ocr: Arc<dyn OcrProvider>,
    clock: Arc<dyn Clock>,
    poll: PollSettings,
}

impl TextExtractor {
    pub fn new(ocr: Arc<dyn OcrProvider>, clock: Arc<dyn Clock>, poll: PollSettings) -> Self {
        Self { ocr, clock, poll }
    }

    /// Extract normalised text from `source`.
    ///
    /// # Errors
    /// - [`PipelineError::ExtractionFailed`] — the OCR capability errored or
    ///   its job reached `FAILED`
    /// - [`PipelineError::ExtractionTimeout`] — the OCR job stayed
    ///   non-terminal for the whole poll budget
    /// - [`PipelineError::EmptyExtraction`] — the result is blank
    pub async fn extract(&self, source: &SourceArtifact) -> Result<String, PipelineError> {
        let text = match source.kind {
            SourceKind::PlainText => decode_lossy(&source.bytes).trim().to_string(),
            SourceKind::Markup => clean_markup(&decode_lossy(&source.bytes)),
            SourceKind::OpticalImage => self.extract_image(source).await?,
            SourceKind::OpticalDocument => self.extract_document(source).await?,
        };

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction {
                source_key: source.key.clone(),
            });
        }

        info!(
            "Extracted {} chars from '{}' ({:?})",
            text.chars().count(),
            source.key,
            source.kind
        );
        Ok(text)
    }

    async fn extract_image(&self, source: &SourceArtifact) -> Result<String, PipelineError> {
        let lines = self
            .ocr
            .detect_text(source)
            .await
            .map_err(|e| PipelineError::ExtractionFailed {
                detail: e.to_string(),
            })?;
        Ok(join_lines(&lines))
    }

    /// Submit an OCR job and poll it until terminal or out of budget.
    async fn extract_document(&self, source: &SourceArtifact) -> Result<String, PipelineError> {
        let job_id = self
            .ocr
            .submit_job(source)
            .await
            .map_err(|e| PipelineError::ExtractionFailed {
                detail: e.to_string(),
            })?;
        info!("OCR job {} submitted for '{}'", job_id, source.key);

        let mut waited = Duration::ZERO;
        while waited < self.poll.max_wait {
            let job = self
                .ocr
                .poll_job(&job_id)
                .await
                .map_err(|e| PipelineError::ExtractionFailed {
                    detail: e.to_string(),
                })?;
            debug!("OCR job {} status {:?} after {:?}", job_id, job.status, waited);

            match job.status {
                OcrJobStatus::Succeeded => return Ok(join_lines(&job.lines)),
                OcrJobStatus::Failed => {
                    return Err(PipelineError::ExtractionFailed {
                        detail: job
                            .message
                            .unwrap_or_else(|| format!("OCR job {job_id} failed")),
                    })
                }
                OcrJobStatus::InProgress => {}
            }

            self.clock.sleep(self.poll.interval).await;
            waited += self.poll.interval;
        }

        if let Err(e) = self.ocr.cancel_job(&job_id).await {
            warn!("Could not cancel OCR job {}: {}", job_id, e);
        }
        Err(PipelineError::ExtractionTimeout {
            waited_secs: waited.as_secs(),
        })
    }
}

/// Join OCR lines with single spaces.
fn join_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode bytes as UTF-8, dropping anything that is not valid UTF-8.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).replace('\u{FFFD}', "")
}

// ── Markup cleaning ──────────────────────────────────────────────────────────

static RE_HEX_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\'([0-9a-fA-F]{2})").expect("valid regex"));
static RE_CONTROL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\([A-Za-z0-9]+)\s?").expect("valid regex"));
static RE_UNICODE_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u-?\d+\??").expect("valid regex"));
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Windows-1252 characters for bytes 0x80..=0x9F; `None` marks the five
/// unassigned positions.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('€'), None, Some('‚'), Some('ƒ'), Some('„'), Some('…'), Some('†'), Some('‡'),
    Some('ˆ'), Some('‰'), Some('Š'), Some('‹'), Some('Œ'), None, Some('Ž'), None,
    None, Some('‘'), Some('’'), Some('“'), Some('”'), Some('•'), Some('–'), Some('—'),
    Some('˜'), Some('™'), Some('š'), Some('›'), Some('œ'), None, Some('ž'), Some('Ÿ'),
];

/// Decode one byte of RTF's default `\ansicpg1252` code page.
fn cp1252_char(b: u8) -> Option<char> {
    match b {
        0x80..=0x9F => CP1252_HIGH[usize::from(b - 0x80)],
        _ => Some(char::from(b)),
    }
}

/// Strip RTF-style control syntax, leaving readable text on one line.
///
/// Rules, in order:
/// 1. `\'hh` hex escapes become the Windows-1252 character they encode
/// 2. Unicode escapes with their fallback marker (`\u-1234?`) are removed
/// 3. control words (`\b`, `\fs24 `) are removed with one trailing space;
///    break words (`\par`, `\line`, `\page`, `\sect`, `\tab`) become a space
/// 4. `{` and `}` are removed
/// 5. whitespace runs collapse to one space; the result is trimmed
pub fn clean_markup(raw: &str) -> String {
    let s = RE_HEX_ESCAPE.replace_all(raw, |caps: &regex::Captures<'_>| {
        u8::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(cp1252_char)
            .map(String::from)
            .unwrap_or_default()
    });
    // Unicode escapes go first: the control-word rule would otherwise eat
    // `\u8364` and leave the `?` fallback behind.
    let s = RE_UNICODE_ESCAPE.replace_all(&s, "");
    let s = RE_CONTROL_WORD.replace_all(&s, |caps: &regex::Captures<'_>| {
        match &caps[1] {
            "par" | "line" | "page" | "sect" | "tab" => " ",
            _ => "",
        }
    });
    let s = s.replace(['{', '}'], "");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}
