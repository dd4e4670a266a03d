//! Synthesis dispatch
//!
//! Request-mode synthesis runs through a per-(session, language) FIFO and
//! a single worker so audio order matches utterance order. The
//! continuous-streaming policy instead holds one persistent bidirectional
//! channel per pair.

mod dispatcher;
mod http;
mod streaming;

pub use dispatcher::{TtsDispatcher, TtsEntry};
pub use http::HttpTtsProvider;
pub use streaming::StreamingTtsChannel;

use async_trait::async_trait;
use thiserror::Error;

/// Synthesis errors
#[derive(Error, Debug, Clone)]
pub enum TtsError {
    #[error("Synthesis request failed: {0}")]
    Request(String),

    #[error("Synthesis service returned {status}")]
    Status { status: u16 },

    #[error("Synthesis timed out")]
    Timeout,

    #[error("Provider temporarily disabled")]
    ProviderDisabled,

    #[error("All synthesis providers failed")]
    Exhausted,

    #[error("Entry dropped under queue pressure")]
    Dropped,

    #[error("Cancelled by session teardown")]
    Cancelled,

    #[error("No synthesis provider configured")]
    NotConfigured,
}

/// One synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub voice: String,
    /// Playback-rate multiplier, 1.0 = natural.
    pub rate: f64,
}

/// Opaque audio returned by a provider.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub format: String,
}

/// A request-mode synthesis provider.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, TtsError>;
}

/// Synthesized audio headed for the listeners of one language.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub language: String,
    pub bytes: Vec<u8>,
    pub format: String,
    pub text: Option<String>,
    pub sequence: u64,
    pub confidence: Option<f64>,
    pub is_final: Option<bool>,
    pub streaming: bool,
}

/// Deterministic default voice per language, used when the listeners of a
/// language disagree about their preferred voice.
pub fn default_voice(language: &str) -> &'static str {
    match language {
        "en" => "en-US-JennyNeural",
        "es" => "es-ES-ElviraNeural",
        "fr" => "fr-FR-DeniseNeural",
        "de" => "de-DE-KatjaNeural",
        "it" => "it-IT-ElsaNeural",
        "pt" => "pt-BR-FranciscaNeural",
        "nl" => "nl-NL-ColetteNeural",
        "pl" => "pl-PL-ZofiaNeural",
        "ru" => "ru-RU-SvetlanaNeural",
        "uk" => "uk-UA-PolinaNeural",
        "tr" => "tr-TR-EmelNeural",
        "ar" => "ar-SA-ZariyahNeural",
        "hi" => "hi-IN-SwaraNeural",
        "ja" => "ja-JP-NanamiNeural",
        "ko" => "ko-KR-SunHiNeural",
        "zh" => "zh-CN-XiaoxiaoNeural",
        "th" => "th-TH-PremwadeeNeural",
        "vi" => "vi-VN-HoaiMyNeural",
        "id" => "id-ID-GadisNeural",
        _ => "en-US-JennyNeural",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_voice_table() {
        assert_eq!(default_voice("es"), "es-ES-ElviraNeural");
        // Unknown languages fall back deterministically.
        assert_eq!(default_voice("xx"), default_voice("yy"));
    }
}
