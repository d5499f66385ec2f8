//! Speech stage: text → one MP3 narration.
//!
//! The voice is chosen once per text from the [`VoiceProfile`]. The text is
//! chunked below the speech request limit, each chunk is synthesised in
//! order, and the segments are stitched with [`stitch_mp3`].

use crate::config::VoiceProfile;
use crate::error::PipelineError;
use crate::pipeline::audio::{stitch_mp3, AudioSegment};
use crate::pipeline::chunk;
use crate::progress::{ProgressCallback, Stage};
use crate::providers::SpeechProvider;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SpeechSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    voices: VoiceProfile,
    char_limit: usize,
    progress: Option<ProgressCallback>,
}

impl SpeechSynthesizer {
    pub fn new(provider: Arc<dyn SpeechProvider>, voices: VoiceProfile, char_limit: usize) -> Self {
        Self {
            provider,
            voices,
            char_limit,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Voice id that narrates `lang`.
    pub fn voice_for(&self, lang: &str) -> &str {
        self.voices.resolve(lang)
    }

    /// Synthesise `text` in `lang` into a single MP3 byte stream.
    ///
    /// Empty text yields empty audio without calling the provider.
    ///
    /// # Errors
    /// [`PipelineError::SynthesisFailed`] with the index of the first chunk
    /// the provider rejected. No partial audio is returned.
    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, PipelineError> {
        let voice = self.voice_for(lang);
        let prepared = chunk::break_long_lines(text, self.char_limit);
        let pieces: Vec<_> = chunk::split(&prepared, self.char_limit).collect();
        let total = pieces.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        info!(
            "Synthesising {} chunk(s) in '{}' with voice '{}'",
            total, lang, voice
        );

        let mut segments = Vec::with_capacity(total);
        for piece in pieces {
            let bytes = self
                .provider
                .synthesize(&piece.text, voice)
                .await
                .map_err(|e| PipelineError::SynthesisFailed {
                    chunk: piece.index,
                    detail: e.to_string(),
                })?;
            debug!("Chunk {}/{} → {} bytes", piece.index + 1, total, bytes.len());
            if let Some(ref cb) = self.progress {
                cb.on_chunk_complete(Stage::Synthesize, piece.index, total);
            }
            segments.push(AudioSegment {
                index: piece.index,
                bytes,
            });
        }

        Ok(stitch_mp3(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns `"<voice>:<text>|"` as the "audio" for each call.
    #[derive(Default)]
    struct EchoSpeech {
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl SpeechProvider for EchoSpeech {
        async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.len();
            calls.push((text.to_string(), voice_id.to_string()));
            if self.fail_on == Some(n) {
                return Err(ProviderError::api("fake-tts", "text too long"));
            }
            Ok(format!("{voice_id}:{text}|").into_bytes())
        }
    }

    #[tokio::test]
    async fn mapped_language_uses_its_voice() {
        let provider = Arc::new(EchoSpeech::default());
        let s = SpeechSynthesizer::new(provider.clone(), VoiceProfile::default(), 3000);
        let audio = s.synthesize("Hola mundo.", "es").await.unwrap();
        assert_eq!(audio, b"nova:Hola mundo.|");
    }

    #[tokio::test]
    async fn unmapped_language_uses_default_voice() {
        let provider = Arc::new(EchoSpeech::default());
        let voices = VoiceProfile::with_default("narrator");
        let s = SpeechSynthesizer::new(provider.clone(), voices, 3000);
        s.synthesize("Ciao.", "it").await.unwrap();
        assert_eq!(provider.calls.lock().unwrap()[0].1, "narrator");
    }

    #[tokio::test]
    async fn segments_are_concatenated_in_order() {
        let provider = Arc::new(EchoSpeech::default());
        let s = SpeechSynthesizer::new(provider.clone(), VoiceProfile::default(), 6);
        let audio = s.synthesize("one\ntwo\nthree", "en").await.unwrap();
        assert_eq!(audio, b"alloy:one|alloy:two|alloy:three|");
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failure_reports_chunk_and_stops() {
        let provider = Arc::new(EchoSpeech {
            fail_on: Some(0),
            ..Default::default()
        });
        let s = SpeechSynthesizer::new(provider.clone(), VoiceProfile::default(), 4);
        let err = s.synthesize("abc\ndef", "en").await.unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailed { chunk: 0, .. }));
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_text_makes_no_calls() {
        let provider = Arc::new(EchoSpeech::default());
        let s = SpeechSynthesizer::new(provider.clone(), VoiceProfile::default(), 3000);
        assert!(s.synthesize("  \n", "en").await.unwrap().is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
