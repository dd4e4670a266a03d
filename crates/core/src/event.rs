//! Transcript and synthesis-unit types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A transcript update from the speaker's recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Cumulative recognized text (partials may revise earlier words).
    pub text: String,

    /// True once the recognizer commits this text.
    pub is_final: bool,

    /// Client-side capture timestamp (ms since epoch).
    pub timestamp_ms: Option<u64>,

    /// Offset into the audio stream (ms).
    pub offset_ms: Option<u64>,

    /// Duration of the recognized span (ms).
    pub duration_ms: Option<u64>,

    /// Pre-computed translations by target language. When present, the
    /// relay uses these instead of calling the translator.
    pub translations: Option<HashMap<String, String>>,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            timestamp_ms: None,
            offset_ms: None,
            duration_ms: None,
            translations: None,
        }
    }

    pub fn with_translations(mut self, translations: HashMap<String, String>) -> Self {
        self.translations = Some(translations);
        self
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A unit of text eligible for synthesis, produced by a segmentation
/// policy. Carries the fingerprint that enforces at-most-once voicing.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// The text to synthesize.
    pub text: String,

    /// Identity for duplicate suppression.
    pub fingerprint: Fingerprint,

    /// Policy-assigned stability confidence in [0, 1].
    pub confidence: f64,

    /// True when this unit came from a final transcript.
    pub is_final: bool,
}

impl Utterance {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        let text = text.into();
        Self {
            fingerprint: Fingerprint::of(&text),
            confidence: 1.0,
            text,
            is_final,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Output of a segmentation policy for one input event.
///
/// Carved policies emit [`Utterance`]s; the continuous-streaming policy
/// emits raw text deltas forwarded verbatim to a persistent synthesis
/// channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisUnit {
    Utterance(Utterance),
    Delta { text: String, is_final: bool },
}

impl SynthesisUnit {
    pub fn utterance(text: impl Into<String>, is_final: bool) -> Self {
        Self::Utterance(Utterance::new(text, is_final))
    }

    /// Text content regardless of variant.
    pub fn text(&self) -> &str {
        match self {
            Self::Utterance(u) => &u.text,
            Self::Delta { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_event_builders() {
        let ev = TranscriptEvent::partial("Hello there");
        assert!(!ev.is_final);
        assert_eq!(ev.word_count(), 2);

        let ev = TranscriptEvent::final_text("Done.");
        assert!(ev.is_final);
        assert!(!ev.is_empty());
    }

    #[test]
    fn test_utterance_fingerprint_matches_text() {
        let u = Utterance::new("Hola a todos.", true);
        assert_eq!(u.fingerprint, Fingerprint::of("hola a todos"));
    }

    #[test]
    fn test_confidence_clamped() {
        let u = Utterance::new("x", false).with_confidence(1.7);
        assert_eq!(u.confidence, 1.0);
    }
}
