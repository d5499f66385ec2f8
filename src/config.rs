//! Configuration types for book-to-audio conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across concurrently running jobs and to log it
//! when diagnosing why two runs differ.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Configuration for the conversion pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use book2audio::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .translate_char_limit(4000)
///     .synthesis_char_limit(2500)
///     .voice("it", "Bianca")
///     .build()
///     .unwrap();
/// assert_eq!(config.voices.resolve("it"), "Bianca");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum characters per translation call. Default: 4500.
    ///
    /// Translation APIs cap a single request at around 5 000 characters;
    /// 4 500 leaves headroom for multi-byte text and request framing.
    pub translate_char_limit: usize,

    /// Maximum characters per speech-synthesis call. Default: 3000.
    ///
    /// Speech providers have a tighter per-request ceiling than translation,
    /// so the synthesis stage re-chunks the translated text independently.
    pub synthesis_char_limit: usize,

    /// Polling behaviour for asynchronous OCR jobs.
    pub poll: PollSettings,

    /// Language assumed when a source object carries no `target_lang` tag.
    pub default_target_lang: String,

    /// Language → voice mapping used by the synthesis stage.
    pub voices: VoiceProfile,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            translate_char_limit: 4500,
            synthesis_char_limit: 3000,
            poll: PollSettings::default(),
            default_target_lang: "en".to_string(),
            voices: VoiceProfile::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("translate_char_limit", &self.translate_char_limit)
            .field("synthesis_char_limit", &self.synthesis_char_limit)
            .field("poll", &self.poll)
            .field("default_target_lang", &self.default_target_lang)
            .field("voices", &self.voices)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn translate_char_limit(mut self, n: usize) -> Self {
        self.config.translate_char_limit = n;
        self
    }

    pub fn synthesis_char_limit(mut self, n: usize) -> Self {
        self.config.synthesis_char_limit = n;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    pub fn max_poll_wait(mut self, max_wait: Duration) -> Self {
        self.config.poll.max_wait = max_wait;
        self
    }

    pub fn default_target_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.default_target_lang = lang.into();
        self
    }

    pub fn voices(mut self, voices: VoiceProfile) -> Self {
        self.config.voices = voices;
        self
    }

    /// Map a single language code to a voice, keeping the rest of the profile.
    pub fn voice(mut self, lang: impl Into<String>, voice_id: impl Into<String>) -> Self {
        self.config.voices.voices.insert(lang.into(), voice_id.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.translate_char_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "Translation chunk limit must be ≥ 1".into(),
            ));
        }
        if c.synthesis_char_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "Synthesis chunk limit must be ≥ 1".into(),
            ));
        }
        if c.synthesis_char_limit > c.translate_char_limit {
            return Err(PipelineError::InvalidConfig(format!(
                "Synthesis chunk limit ({}) exceeds translation chunk limit ({})",
                c.synthesis_char_limit, c.translate_char_limit
            )));
        }
        if c.poll.interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if c.poll.interval > c.poll.max_wait {
            return Err(PipelineError::InvalidConfig(format!(
                "Poll interval ({:?}) exceeds maximum wait ({:?})",
                c.poll.interval, c.poll.max_wait
            )));
        }
        if c.default_target_lang.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Default target language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Bounded polling for asynchronous OCR jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay between two status polls. Default: 2 s.
    pub interval: Duration,
    /// Total wait after which a non-terminal job is abandoned. Default: 60 s.
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Static mapping from language code to a synthesis voice identifier.
///
/// Unmapped languages fall back to `default_voice`; resolution never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub default_voice: String,
    pub voices: BTreeMap<String, String>,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        let voices = [
            ("en", "alloy"),
            ("hi", "shimmer"),
            ("es", "nova"),
            ("fr", "fable"),
            ("de", "onyx"),
        ]
        .into_iter()
        .map(|(lang, voice)| (lang.to_string(), voice.to_string()))
        .collect();

        Self {
            default_voice: "alloy".to_string(),
            voices,
        }
    }
}

impl VoiceProfile {
    /// An empty profile that always answers `default_voice`.
    pub fn with_default(default_voice: impl Into<String>) -> Self {
        Self {
            default_voice: default_voice.into(),
            voices: BTreeMap::new(),
        }
    }

    /// Resolve the voice for `lang`.
    ///
    /// Lookup order: exact code, then the primary subtag (`es-MX` → `es`),
    /// then the default voice.
    pub fn resolve(&self, lang: &str) -> &str {
        if let Some(v) = self.voices.get(lang) {
            return v;
        }
        let primary = lang.split(['-', '_']).next().unwrap_or(lang);
        self.voices
            .get(primary)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_limits() {
        let c = PipelineConfig::default();
        assert_eq!(c.translate_char_limit, 4500);
        assert_eq!(c.synthesis_char_limit, 3000);
        assert_eq!(c.poll.interval, Duration::from_secs(2));
        assert_eq!(c.poll.max_wait, Duration::from_secs(60));
        assert_eq!(c.default_target_lang, "en");
    }

    #[test]
    fn zero_limit_rejected() {
        let err = PipelineConfig::builder()
            .synthesis_char_limit(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn synthesis_limit_above_translation_limit_rejected() {
        let err = PipelineConfig::builder()
            .translate_char_limit(2000)
            .synthesis_char_limit(3000)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
        assert!(err.to_string().contains("exceeds translation chunk limit"));

        assert!(PipelineConfig::builder()
            .translate_char_limit(3000)
            .synthesis_char_limit(3000)
            .build()
            .is_ok());
    }

    #[test]
    fn poll_interval_longer_than_wait_rejected() {
        let err = PipelineConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .max_poll_wait(Duration::from_secs(5))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum wait"));
    }

    #[test]
    fn mapped_voice_resolves_exactly() {
        let p = VoiceProfile::default();
        assert_eq!(p.resolve("es"), "nova");
        assert_eq!(p.resolve("de"), "onyx");
    }

    #[test]
    fn unmapped_voice_uses_default() {
        let p = VoiceProfile::default();
        assert_eq!(p.resolve("sw"), "alloy");
        assert_eq!(p.resolve(""), "alloy");
    }

    #[test]
    fn regional_code_uses_primary_subtag() {
        let p = VoiceProfile::default();
        assert_eq!(p.resolve("fr-CA"), "fable");
        assert_eq!(p.resolve("hi_IN"), "shimmer");
    }

    #[test]
    fn builder_voice_overrides_single_entry() {
        let c = PipelineConfig::builder().voice("en", "echo").build().unwrap();
        assert_eq!(c.voices.resolve("en"), "echo");
        assert_eq!(c.voices.resolve("es"), "nova");
    }
}
