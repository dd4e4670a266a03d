//! Client and server event envelopes

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Events accepted from edge connections (speakers and listeners).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// A speaker claims a session code.
    SpeakerJoin {
        code: String,
        source_lang: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_langs: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_hint: Option<String>,
    },

    /// A transcript update from the speaker's recognizer. Some clients
    /// emit distinctly named partial events; they alias here with
    /// `is_final` defaulted off.
    #[serde(alias = "partial-transcript", alias = "interim-transcript")]
    Transcript {
        code: String,
        text: String,
        #[serde(default)]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        translations: Option<HashMap<String, String>>,
    },

    /// Committed-transcript alias used by recognizers that signal
    /// finality through the event name instead of a flag.
    FinalTranscript {
        code: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        translations: Option<HashMap<String, String>>,
    },

    /// A listener subscribes to a session in one language.
    ListenerJoin {
        code: String,
        lang: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
    },

    ChangeLanguage {
        code: String,
        lang: String,
    },

    UpdateVoice {
        code: String,
        voice: String,
    },

    ListenerLeave {
        code: String,
    },

    Ping,
}

/// Audio payload carried inside the `audio-stream` event. Field names
/// follow the browser-side contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioStreamPayload {
    /// Base64-encoded audio bytes.
    pub audio: String,

    /// Container/codec hint, e.g. `mp3`.
    pub format: String,

    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Monotonic per-(session, language) ordering counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(rename = "isStable", default, skip_serializing_if = "Option::is_none")]
    pub is_stable: Option<bool>,

    #[serde(rename = "isFinal", default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,

    /// Set when the bytes came from a persistent synthesis channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
}

impl AudioStreamPayload {
    pub fn new(audio_bytes: &[u8], format: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            audio: BASE64.encode(audio_bytes),
            format: format.into(),
            language: language.into(),
            text: None,
            sequence: None,
            confidence: None,
            is_stable: None,
            is_final: None,
            streaming: None,
        }
    }

    pub fn decode_audio(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.audio)
    }
}

/// Events emitted to edge connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Join acknowledgement for speakers and listeners.
    Joined {
        ok: bool,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        available_languages: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_lang: Option<String>,
    },

    SessionStarted {
        code: String,
    },

    SessionNotFound {
        code: String,
    },

    SpeakerDisconnected {
        code: String,
    },

    LanguageChanged {
        lang: String,
    },

    VoiceUpdated {
        voice: String,
    },

    /// Display text for one listener language.
    TranslationUpdate {
        text: String,
        language: String,
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial_number: Option<u64>,
    },

    /// Synthesized audio for one listener language.
    AudioStream(AudioStreamPayload),

    /// Diagnostic echo to the speaker: what was heard and how it fanned
    /// out.
    TranslationBroadcast {
        original: String,
        translations: HashMap<String, String>,
        is_final: bool,
        timestamp: u64,
        latency_ms: u64,
    },

    Error {
        message: String,
    },

    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_join_wire_shape() {
        let frame = r#"{"event":"speaker-join","code":"DEMO","source_lang":"en"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            event,
            ClientEvent::SpeakerJoin { ref code, ref source_lang, .. }
                if code == "DEMO" && source_lang == "en"
        ));
    }

    #[test]
    fn test_transcript_aliases() {
        let frame = r#"{"event":"partial-transcript","code":"DEMO","text":"Hola"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Transcript { is_final: false, .. }
        ));

        let frame = r#"{"event":"final-transcript","code":"DEMO","text":"Hola."}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::FinalTranscript { .. }));
    }

    #[test]
    fn test_transcript_with_supplied_translations() {
        let frame = r#"{"event":"transcript","code":"DEMO","text":"Hi","is_final":true,
                        "translations":{"es":"Hola"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::Transcript { translations, .. } => {
                assert_eq!(translations.unwrap()["es"], "Hola");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_audio_stream_field_names() {
        let payload = AudioStreamPayload {
            sequence: Some(3),
            is_final: Some(true),
            is_stable: Some(true),
            ..AudioStreamPayload::new(b"abc", "mp3", "es")
        };
        let json = serde_json::to_string(&ServerEvent::AudioStream(payload)).unwrap();
        assert!(json.contains("\"event\":\"audio-stream\""));
        assert!(json.contains("\"isFinal\":true"));
        assert!(json.contains("\"isStable\":true"));
        assert!(json.contains("\"format\":\"mp3\""));
    }

    #[test]
    fn test_audio_round_trip() {
        let payload = AudioStreamPayload::new(&[1u8, 2, 3, 255], "mp3", "fr");
        assert_eq!(payload.decode_audio().unwrap(), vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_translation_update_shape() {
        let event = ServerEvent::TranslationUpdate {
            text: "Hola".to_string(),
            language: "es".to_string(),
            is_final: false,
            partial_number: Some(4),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"translation-update\""));
        assert!(json.contains("\"partial_number\":4"));
    }
}
