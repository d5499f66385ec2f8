//! HTTP client for OpenAI-compatible text-to-speech endpoints.
//!
//! `POST {endpoint}` with `{"model", "input", "voice", "response_format": "mp3"}`
//! and a bearer token; the response body is the encoded audio.

use crate::error::{PipelineError, ProviderError};
use crate::providers::SpeechProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "speech";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";
pub const DEFAULT_MODEL: &str = "tts-1";

/// Request body sent to the speech endpoint.
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// [`SpeechProvider`] talking to an OpenAI-compatible `/v1/audio/speech` API.
pub struct HttpSpeech {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpSpeech {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Build a client from `endpoint`/`model` overrides and `OPENAI_API_KEY`.
    ///
    /// The key is only required for the default public endpoint; self-hosted
    /// compatible servers commonly run without one.
    pub fn from_env(endpoint: Option<&str>, model: Option<&str>) -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT);
        if api_key.is_none() && endpoint == DEFAULT_ENDPOINT {
            return Err(PipelineError::ProviderNotConfigured {
                provider: PROVIDER.to_string(),
                hint: "Set OPENAI_API_KEY or point --tts-endpoint at a compatible server."
                    .to_string(),
            });
        }
        Ok(Self::new(endpoint, model.unwrap_or(DEFAULT_MODEL), api_key))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeech {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ProviderError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: voice_id,
            response_format: "mp3",
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            return Err(ProviderError::api(PROVIDER, format!("({status}) {error_text}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e.to_string()))?;
        if audio.is_empty() {
            return Err(ProviderError::invalid_response(PROVIDER, "empty audio body"));
        }
        debug!("Synthesised {} chars → {} bytes", text.chars().count(), audio.len());
        Ok(audio.to_vec())
    }
}
