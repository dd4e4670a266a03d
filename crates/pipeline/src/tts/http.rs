//! HTTP synthesis provider

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{AudioPayload, SynthesisRequest, TtsError, TtsProvider};

/// Request-mode synthesis over HTTP: one text in, one finite audio body
/// out. The playback rate rides along as a provider-native field.
pub struct HttpTtsProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    format: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    language: &'a str,
    voice: &'a str,
    rate: f64,
    format: &'a str,
}

impl HttpTtsProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: String,
        api_key: Option<String>,
        format: String,
        timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            format,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, TtsError> {
        let mut req = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .timeout(self.timeout)
            .json(&SynthesizeBody {
                text: &request.text,
                language: &request.language,
                voice: &request.voice,
                rate: request.rate,
                format: &self.format,
            });
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TtsError::Timeout
            } else {
                TtsError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        Ok(AudioPayload {
            bytes: bytes.to_vec(),
            format: self.format.clone(),
        })
    }
}
