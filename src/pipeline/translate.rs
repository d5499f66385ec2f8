//! Translation stage: long text → translated text, chunk by chunk.
//!
//! The text is cut with [`chunk::split`] at the translation limit (after
//! [`chunk::break_long_lines`] gives overlong lines sentence breaks), every
//! chunk is translated with source-language auto-detection, and the results
//! are rejoined in index order with single spaces.
//!
//! A failed chunk aborts the whole text. A partial translation would leave
//! the narration silently missing passages, so none is ever returned.

use crate::error::PipelineError;
use crate::pipeline::chunk::{self, join_chunks, TextChunk};
use crate::progress::{ProgressCallback, Stage};
use crate::providers::TranslationProvider;
use std::sync::Arc;
use tracing::{debug, info};

/// Source-language code that asks the provider to detect the language.
pub const AUTO_DETECT: &str = "auto";

/// Translates arbitrarily long text through a size-limited provider.
pub struct Translator {
    provider: Arc<dyn TranslationProvider>,
    char_limit: usize,
    progress: Option<ProgressCallback>,
}

impl Translator {
    pub fn new(provider: Arc<dyn TranslationProvider>, char_limit: usize) -> Self {
        Self {
            provider,
            char_limit,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Translate `text` into `target_lang`.
    ///
    /// Empty input returns an empty string without calling the provider.
    ///
    /// # Errors
    /// [`PipelineError::TranslationFailed`] carrying the index of the first
    /// chunk whose provider call failed.
    pub async fn translate_long(
        &self,
        text: &str,
        target_lang: &str,
    ) -> Result<String, PipelineError> {
        let mut translated = self.translate_chunks(text, target_lang).await?;
        Ok(join_chunks(&mut translated))
    }

    /// Translate `text` and return the translated chunks, index-aligned with
    /// the source chunks.
    pub async fn translate_chunks(
        &self,
        text: &str,
        target_lang: &str,
    ) -> Result<Vec<TextChunk>, PipelineError> {
        let prepared = chunk::break_long_lines(text, self.char_limit);
        let pieces: Vec<TextChunk> = chunk::split(&prepared, self.char_limit).collect();
        let total = pieces.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        info!("Translating {} chunk(s) into '{}'", total, target_lang);

        let mut translated = Vec::with_capacity(total);
        for piece in pieces {
            let out = self
                .provider
                .translate(&piece.text, AUTO_DETECT, target_lang)
                .await
                .map_err(|e| PipelineError::TranslationFailed {
                    chunk: piece.index,
                    detail: e.to_string(),
                })?;
            debug!(
                "Chunk {}/{}: {} → {} chars",
                piece.index + 1,
                total,
                piece.char_len(),
                out.chars().count()
            );
            if let Some(ref cb) = self.progress {
                cb.on_chunk_complete(Stage::Translate, piece.index, total);
            }
            translated.push(TextChunk {
                index: piece.index,
                text: out.trim().to_string(),
            });
        }

        Ok(translated)
    }
}
