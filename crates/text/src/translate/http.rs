//! HTTP translation client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::TranslateError;

use super::Translator;

/// Client for an HTTP translation service.
///
/// Wire contract: `POST {base}/translate` with a JSON batch request,
/// `POST {base}/detect` for language detection. Timeouts are short and
/// enforced per request; the caller treats every error as non-fatal.
pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    translate_timeout: Duration,
    detect_timeout: Duration,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    texts: &'a [String],
    targets: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    /// One map per input text, keyed by target language.
    translations: Vec<HashMap<String, String>>,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    language: Option<String>,
}

impl HttpTranslator {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        translate_timeout_ms: u64,
        detect_timeout_ms: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            translate_timeout: Duration::from_millis(translate_timeout_ms),
            detect_timeout: Duration::from_millis(detect_timeout_ms),
        }
    }

    fn request(&self, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .timeout(timeout);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    fn map_error(e: reqwest::Error) -> TranslateError {
        if e.is_timeout() {
            TranslateError::Timeout
        } else {
            TranslateError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        targets: &[String],
        source: Option<&str>,
    ) -> Result<HashMap<String, String>, TranslateError> {
        let texts = [text.to_string()];
        let mut batch = self.translate_batch(&texts, targets, source).await?;
        batch
            .pop()
            .ok_or_else(|| TranslateError::Malformed("empty translation batch".to_string()))
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        targets: &[String],
        source: Option<&str>,
    ) -> Result<Vec<HashMap<String, String>>, TranslateError> {
        let response = self
            .request("/translate", self.translate_timeout)
            .json(&TranslateRequest {
                texts,
                targets,
                source,
            })
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;

        if parsed.translations.len() != texts.len() {
            return Err(TranslateError::Malformed(format!(
                "expected {} translation maps, got {}",
                texts.len(),
                parsed.translations.len()
            )));
        }

        Ok(parsed.translations)
    }

    async fn detect(&self, text: &str) -> Result<Option<String>, TranslateError> {
        let response = self
            .request("/detect", self.detect_timeout)
            .json(&DetectRequest { text })
            .send()
            .await
            .map_err(Self::map_error)?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;
        Ok(parsed.language)
    }
}
