//! Time-limited upload URLs.
//!
//! An [`UploadGrant`] lets a client write one object into the source store
//! without holding store credentials. The URL is bound to the destination
//! key, the content type and the `target_lang` tag, and expires after
//! [`DEFAULT_EXPIRY_SECS`]. Whoever accepts the upload checks it with
//! [`UploadAuthorizer::verify`] before storing the bytes.
//!
//! Query parameters: `key`, `content_type`, `target_lang`, `expires` (unix
//! seconds) and `signature`, a base64url HMAC-SHA256 over the other four.
//! Each field enters the MAC behind its length, so no value can spill into
//! its neighbour.

use crate::error::PipelineError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

pub const DEFAULT_EXPIRY_SECS: i64 = 300;
pub const DEFAULT_UPLOAD_LANG: &str = "en";
pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

type HmacSha256 = Hmac<Sha256>;

/// A signed, expiring permission to upload one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadGrant {
    pub url: String,
    pub key: String,
    pub content_type: String,
    pub target_lang: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks upload URLs.
#[derive(Clone)]
pub struct UploadAuthorizer {
    base_url: Url,
    signing_key: Vec<u8>,
    expiry: Duration,
}

impl std::fmt::Debug for UploadAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadAuthorizer")
            .field("base_url", &self.base_url.as_str())
            .field("signing_key", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl UploadAuthorizer {
    pub fn new(base_url: &str, signing_key: impl Into<Vec<u8>>) -> Result<Self, PipelineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::InvalidConfig(format!("upload base URL '{base_url}': {e}")))?;
        let signing_key = signing_key.into();
        if signing_key.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "upload signing key must not be empty".into(),
            ));
        }
        Ok(Self {
            base_url,
            signing_key,
            expiry: Duration::seconds(DEFAULT_EXPIRY_SECS),
        })
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Issue a grant for `filename`.
    ///
    /// `lang` defaults to `"en"` and `content_type` to
    /// `application/octet-stream`.
    ///
    /// # Errors
    /// [`PipelineError::InvalidConfig`] when `filename` is missing or blank,
    /// or any field contains a control character.
    pub fn authorize(
        &self,
        filename: Option<&str>,
        lang: Option<&str>,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UploadGrant, PipelineError> {
        let key = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| PipelineError::InvalidConfig("filename required".into()))?;
        let target_lang = non_blank(lang).unwrap_or(DEFAULT_UPLOAD_LANG);
        let content_type = non_blank(content_type).unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE);
        for (field, value) in [
            ("filename", key),
            ("content type", content_type),
            ("language", target_lang),
        ] {
            if value.chars().any(char::is_control) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{field} must not contain control characters"
                )));
            }
        }

        // Whole seconds, so the grant matches what the URL can express.
        let expires = (now + self.expiry).timestamp();
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| PipelineError::InvalidConfig("upload expiry out of range".into()))?;
        let signature = URL_SAFE_NO_PAD.encode(self.mac(key, content_type, target_lang, expires)?);

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("content_type", content_type)
            .append_pair("target_lang", target_lang)
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        debug!("Issued upload URL for '{}' expiring {}", key, expires_at);
        Ok(UploadGrant {
            url: url.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            target_lang: target_lang.to_string(),
            expires_at,
        })
    }

    /// Check a URL issued by [`authorize`](Self::authorize).
    ///
    /// Returns the grant it encodes if the signature matches and it has not
    /// expired at `now`; `None` otherwise.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> Option<UploadGrant> {
        let parsed = Url::parse(url).ok()?;
        let mut key = None;
        let mut content_type = None;
        let mut target_lang = None;
        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "key" => key = Some(value.into_owned()),
                "content_type" => content_type = Some(value.into_owned()),
                "target_lang" => target_lang = Some(value.into_owned()),
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }
        let (key, content_type, target_lang, expires, signature) =
            (key?, content_type?, target_lang?, expires?, signature?);

        let expected = self.mac(&key, &content_type, &target_lang, expires).ok()?;
        let given = URL_SAFE_NO_PAD.decode(signature.as_bytes()).ok()?;
        if !bool::from(expected.as_slice().ct_eq(given.as_slice())) {
            debug!("Rejected upload URL for '{}': bad signature", key);
            return None;
        }
        let expires_at = Utc.timestamp_opt(expires, 0).single()?;
        if now >= expires_at {
            debug!("Rejected upload URL for '{}': expired at {}", key, expires_at);
            return None;
        }

        Some(UploadGrant {
            url: url.to_string(),
            key,
            content_type,
            target_lang,
            expires_at,
        })
    }

    fn mac(
        &self,
        key: &str,
        content_type: &str,
        target_lang: &str,
        expires: i64,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| PipelineError::Internal(format!("upload signing key: {e}")))?;
        for part in [key, content_type, target_lang] {
            mac.update(&(part.len() as u64).to_be_bytes());
            mac.update(part.as_bytes());
        }
        mac.update(&expires.to_be_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorizer() -> UploadAuthorizer {
        UploadAuthorizer::new("https://uploads.example.com/put", "s3cret").unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn grant_carries_defaults() {
        let g = authorizer().authorize(Some("book.pdf"), None, None, t0()).unwrap();
        assert_eq!(g.key, "book.pdf");
        assert_eq!(g.target_lang, "en");
        assert_eq!(g.content_type, "application/octet-stream");
        assert_eq!(g.expires_at, t0() + Duration::seconds(300));
        assert!(g.url.starts_with("https://uploads.example.com/put?key=book.pdf"));
    }

    #[test]
    fn missing_filename_is_rejected() {
        let err = authorizer().authorize(None, Some("es"), None, t0()).unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
        assert!(authorizer().authorize(Some("  "), None, None, t0()).is_err());
    }

    #[test]
    fn issued_url_verifies_until_expiry() {
        let auth = authorizer();
        let g = auth
            .authorize(Some("my book.txt"), Some("hi"), Some("text/plain"), t0())
            .unwrap();

        let ok = auth.verify(&g.url, t0() + Duration::seconds(299)).unwrap();
        assert_eq!(ok.key, "my book.txt");
        assert_eq!(ok.target_lang, "hi");
        assert_eq!(ok.content_type, "text/plain");

        assert!(auth.verify(&g.url, t0() + Duration::seconds(300)).is_none());
    }

    #[test]
    fn tampered_url_is_rejected() {
        let auth = authorizer();
        let g = auth.authorize(Some("a.txt"), Some("es"), None, t0()).unwrap();
        let tampered = g.url.replace("target_lang=es", "target_lang=fr");
        assert!(auth.verify(&tampered, t0()).is_none());
    }

    #[test]
    fn fields_cannot_shift_across_boundaries() {
        let auth = authorizer();
        let g = auth
            .authorize(Some("ab"), Some("d"), Some("c"), t0())
            .unwrap();
        let parsed = Url::parse(&g.url).unwrap();
        let field = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };

        let mut forged = Url::parse("https://uploads.example.com/put").unwrap();
        forged
            .query_pairs_mut()
            .append_pair("key", "a")
            .append_pair("content_type", "bc")
            .append_pair("target_lang", "d")
            .append_pair("expires", &field("expires"))
            .append_pair("signature", &field("signature"));
        assert!(auth.verify(forged.as_str(), t0()).is_none());
        assert!(auth.verify(&g.url, t0()).is_some());
    }

    #[test]
    fn control_characters_are_rejected() {
        let auth = authorizer();
        let err = auth
            .authorize(Some("a\nb"), Some("d"), Some("c"), t0())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
        assert!(auth.authorize(Some("a.txt"), Some("e\ns"), None, t0()).is_err());
        assert!(auth.authorize(Some("a.txt"), None, Some("text/plain\r"), t0()).is_err());
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let auth = authorizer();
        let g = auth.authorize(Some("a.txt"), None, None, t0()).unwrap();
        let sig_start = g.url.find("signature=").unwrap() + "signature=".len();
        let broken = format!("{}!!!", &g.url[..sig_start]);
        assert!(auth.verify(&broken, t0()).is_none());
        let truncated = &g.url[..g.url.len() - 4];
        assert!(auth.verify(truncated, t0()).is_none());
    }

    #[test]
    fn other_key_cannot_verify() {
        let g = authorizer().authorize(Some("a.txt"), None, None, t0()).unwrap();
        let other = UploadAuthorizer::new("https://uploads.example.com/put", "different").unwrap();
        assert!(other.verify(&g.url, t0()).is_none());
    }

    #[test]
    fn debug_redacts_key() {
        assert!(!format!("{:?}", authorizer()).contains("s3cret"));
    }
}
