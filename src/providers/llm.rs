//! LLM provider resolution and the LLM-backed translator.
//!
//! Both [`LlmTranslator`] and [`super::vision::VisionOcr`] sit on top of any
//! `edgequake_llm::LLMProvider`. [`resolve_provider`] picks that provider
//! from the most specific setting available.

use crate::error::{PipelineError, ProviderError};
use crate::prompts::{translation_instruction, TRANSLATION_SYSTEM_PROMPT};
use crate::providers::TranslationProvider;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LLMResponse, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const PROVIDER_LABEL: &str = "llm";

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Which LLM to talk to.
#[derive(Clone, Default)]
pub struct ProviderSelection {
    /// Pre-built provider; takes priority over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Provider name understood by `ProviderFactory` (`"openai"`, `"anthropic"`, …).
    pub provider_name: Option<String>,
    pub model: Option<String>,
}

impl fmt::Debug for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSelection")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .finish()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`selection.provider`), used as-is.
/// 2. **Named provider + model** (`selection.provider_name`); the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when
///    both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, so users holding several keys
///    get a predictable default.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(selection: &ProviderSelection) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = selection.provider {
        return Ok(Arc::clone(provider));
    }

    let model = selection.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = selection.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Response cleanup ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*)\n```\s*$").expect("valid regex"));

/// Undo the formatting habits chat models fall into despite the prompt:
/// an outer code fence, CRLF line endings and invisible Unicode.
pub(crate) fn clean_response(input: &str) -> String {
    let trimmed = input.trim();
    let unfenced = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };
    let normalised = unfenced.replace("\r\n", "\n").replace('\r', "\n");
    remove_invisible_chars(&normalised).trim().to_string()
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Translator ───────────────────────────────────────────────────────────────

/// Output-token floor for one translation request.
const MIN_TRANSLATION_TOKENS: usize = 1024;
/// Output-token ceiling for one translation request.
const MAX_TRANSLATION_TOKENS: usize = 16_384;

/// Output-token budget for translating `input_chars` characters.
///
/// Non-Latin scripts can cost more than one token per character, so the
/// budget is two tokens per input character.
pub fn translation_token_budget(input_chars: usize) -> usize {
    input_chars
        .saturating_mul(2)
        .clamp(MIN_TRANSLATION_TOKENS, MAX_TRANSLATION_TOKENS)
}

/// [`TranslationProvider`] that prompts a chat model to translate.
pub struct LlmTranslator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    /// Fixed output-token cap; `None` scales with each chunk.
    max_tokens: Option<usize>,
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.1,
            max_tokens: None,
        }
    }

    /// Resolve a provider with [`resolve_provider`] and wrap it.
    pub fn from_selection(selection: &ProviderSelection) -> Result<Self, PipelineError> {
        Ok(Self::new(resolve_provider(selection)?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Use a fixed output-token cap instead of [`translation_token_budget`].
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn options(&self, text: &str) -> CompletionOptions {
        let max_tokens = self
            .max_tokens
            .unwrap_or_else(|| translation_token_budget(text.chars().count()));
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }
}

/// Turn a chat response into translated text.
///
/// A response cut off at the token limit is an error: passing it on would
/// drop the tail of the chunk from the narration.
fn accept_translation(response: &LLMResponse) -> Result<String, ProviderError> {
    if response.finish_reason.as_deref() == Some("length") {
        return Err(ProviderError::invalid_response(
            PROVIDER_LABEL,
            format!(
                "translation truncated at the output token limit ({} tokens)",
                response.completion_tokens
            ),
        ));
    }
    let translated = clean_response(&response.content);
    if translated.is_empty() {
        return Err(ProviderError::invalid_response(PROVIDER_LABEL, "empty translation"));
    }
    Ok(translated)
}

#[async_trait]
impl TranslationProvider for LlmTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError> {
        let instruction = translation_instruction(text, source_lang, target_lang);
        let messages = vec![
            ChatMessage::system(TRANSLATION_SYSTEM_PROMPT),
            ChatMessage::user_with_images(&instruction, vec![]),
        ];
        let response = self
            .provider
            .chat(&messages, Some(&self.options(text)))
            .await
            .map_err(|e| ProviderError::api(PROVIDER_LABEL, e.to_string()))?;
        debug!(
            "Translation: {} input tokens, {} output tokens, finish {:?}",
            response.prompt_tokens, response.completion_tokens, response.finish_reason
        );
        accept_translation(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(clean_response("```\nHola mundo\n```"), "Hola mundo");
        assert_eq!(clean_response("```text\nHola\nmundo\n```\n"), "Hola\nmundo");
    }

    #[test]
    fn crlf_and_invisible_chars_are_removed() {
        assert_eq!(clean_response("\u{FEFF}Hola\r\nmun\u{200B}do  "), "Hola\nmundo");
    }

    #[test]
    fn plain_answer_is_untouched() {
        assert_eq!(clean_response("Bonjour le monde."), "Bonjour le monde.");
    }

    #[test]
    fn truncated_translation_is_rejected() {
        let response = LLMResponse::new("Hola mun", "gpt-4.1-nano")
            .with_usage(10, 4096)
            .with_finish_reason("length");
        let err = accept_translation(&response).unwrap_err();
        assert!(err.to_string().contains("truncated"), "got {err}");
    }

    #[test]
    fn completed_translation_is_cleaned() {
        let response =
            LLMResponse::new("```\nHola mundo\n```", "gpt-4.1-nano").with_finish_reason("stop");
        assert_eq!(accept_translation(&response).unwrap(), "Hola mundo");

        let no_reason = LLMResponse::new("Hola", "gpt-4.1-nano");
        assert_eq!(accept_translation(&no_reason).unwrap(), "Hola");
    }

    #[test]
    fn blank_translation_is_rejected() {
        let response = LLMResponse::new("  \n ", "gpt-4.1-nano").with_finish_reason("stop");
        assert!(accept_translation(&response).is_err());
    }

    #[test]
    fn token_budget_scales_with_chunk_size() {
        assert_eq!(translation_token_budget(10), 1024);
        assert_eq!(translation_token_budget(4500), 9000);
        assert_eq!(translation_token_budget(100_000), 16_384);
    }

    #[test]
    fn fixed_cap_overrides_budget() {
        let translator = LlmTranslator::new(Arc::new(edgequake_llm::MockProvider::new()));
        assert_eq!(translator.options(&"a".repeat(4500)).max_tokens, Some(9000));
        let fixed = translator.with_max_tokens(2000);
        assert_eq!(fixed.options(&"a".repeat(4500)).max_tokens, Some(2000));
    }
}
