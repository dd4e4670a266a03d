//! Segmentation engine
//!
//! A segmentation policy consumes the ordered stream of translated
//! `(text, is_final)` events for one (session, language) and emits
//! synthesis units. All policies share the fingerprint-based
//! already-spoken set; whatever else they track is their own.
//!
//! Policies are synchronous state machines. Time-driven behavior
//! (stability windows, quiescence delays) surfaces through [`poll`],
//! which the owning pipeline task calls on a short interval.
//!
//! [`poll`]: SegmentationPolicy::poll

mod conference;
mod continuous;
mod cursor;
mod final_only;
mod hybrid;
mod natural;
mod ultra;

pub use conference::ConferencePolicy;
pub use continuous::ContinuousPolicy;
pub use final_only::FinalOnlyPolicy;
pub use hybrid::HybridPolicy;
pub use natural::NaturalPhrasePolicy;
pub use ultra::UltraLowLatencyPolicy;

use std::collections::HashSet;

use relay_config::{SegmentationPolicyKind, SegmentationSettings};
use relay_core::{jaccard_similarity, normalize, Fingerprint, SynthesisUnit};

/// One segmentation policy instance, exclusively owned by its
/// (session, language) pipeline.
pub trait SegmentationPolicy: Send {
    /// Consume one translated transcript event.
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit>;

    /// Advance time-driven state. Called on a short interval.
    fn poll(&mut self) -> Vec<SynthesisUnit>;

    /// Drop all state for a fresh stream.
    fn reset(&mut self);
}

/// Build the configured policy.
pub fn build_policy(settings: &SegmentationSettings) -> Box<dyn SegmentationPolicy> {
    match settings.policy {
        SegmentationPolicyKind::FinalOnly => {
            Box::new(FinalOnlyPolicy::new(settings.final_only.clone()))
        }
        SegmentationPolicyKind::Hybrid => Box::new(HybridPolicy::new(settings.hybrid.clone())),
        SegmentationPolicyKind::Conference => {
            Box::new(ConferencePolicy::new(settings.conference.clone()))
        }
        SegmentationPolicyKind::NaturalPhrase => {
            Box::new(NaturalPhrasePolicy::new(settings.natural_phrase.clone()))
        }
        SegmentationPolicyKind::UltraLowLatency => {
            Box::new(UltraLowLatencyPolicy::new(settings.ultra_low_latency.clone()))
        }
        SegmentationPolicyKind::Continuous => {
            Box::new(ContinuousPolicy::new(settings.continuous.clone()))
        }
    }
}

/// The already-spoken record for one (session, language).
///
/// Membership is checked three ways: exact fingerprint equality,
/// bidirectional substring containment over normalized text, and
/// token-set similarity against everything spoken so far.
#[derive(Debug, Default)]
pub struct SpokenLog {
    fingerprints: HashSet<Fingerprint>,
    normalized: Vec<String>,
}

impl SpokenLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-identity check only.
    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.fingerprints.contains(&fingerprint)
    }

    /// Full duplicate check: exact, containment, or similarity at or
    /// above `jaccard_threshold`.
    pub fn is_duplicate(&self, text: &str, jaccard_threshold: f64) -> bool {
        if self.fingerprints.contains(&Fingerprint::of(text)) {
            return true;
        }
        let norm = normalize(text);
        if norm.is_empty() {
            return true;
        }
        self.normalized.iter().any(|prior| {
            prior.contains(&norm)
                || norm.contains(prior.as_str())
                || jaccard_similarity(prior, &norm) >= jaccard_threshold
        })
    }

    /// Similarity-only check against every prior utterance.
    pub fn is_similar(&self, text: &str, jaccard_threshold: f64) -> bool {
        let norm = normalize(text);
        self.normalized
            .iter()
            .any(|prior| jaccard_similarity(prior, &norm) >= jaccard_threshold)
    }

    pub fn record(&mut self, text: &str) {
        self.fingerprints.insert(Fingerprint::of(text));
        self.normalized.push(normalize(text));
    }

    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn clear(&mut self) {
        self.fingerprints.clear();
        self.normalized.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoken_log_exact_and_containment() {
        let mut log = SpokenLog::new();
        log.record("Hola a todos.");

        assert!(log.is_duplicate("hola a todos", 0.85));
        assert!(log.is_duplicate("Hola a", 0.85)); // contained in prior
        assert!(!log.is_duplicate("Bienvenidos a la reunión.", 0.85));
    }

    #[test]
    fn test_spoken_log_jaccard() {
        let mut log = SpokenLog::new();
        log.record("the quick brown fox jumps over the fence");
        assert!(log.is_duplicate("the quick brown fox leaps over the fence", 0.7));
        assert!(!log.is_duplicate("an entirely different sentence here", 0.7));
    }

    #[test]
    fn test_build_policy_matches_kind() {
        let mut settings = SegmentationSettings::default();
        settings.policy = SegmentationPolicyKind::Continuous;
        let mut policy = build_policy(&settings);
        // Continuous emits deltas, never utterances.
        let units = policy.on_text("abcdef", false);
        assert!(matches!(units.first(), Some(SynthesisUnit::Delta { .. })));
    }
}
