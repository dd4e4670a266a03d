//! Conference policy
//!
//! Final-only with aggressive duplicate rejection for long monologues:
//! a sentence must clear the fingerprint check, a five-word-prefix check
//! against everything previously stored, and a similarity check against
//! every prior utterance.

use std::collections::HashMap;

use relay_config::ConferenceTuning;
use relay_core::{normalize, Fingerprint, SynthesisUnit};
use relay_text::sentence::{split_complete_sentences, word_count};

use super::{SegmentationPolicy, SpokenLog};

pub struct ConferencePolicy {
    tuning: ConferenceTuning,
    spoken: SpokenLog,
    /// Normalized first-five-word prefix of each voiced sentence, mapped
    /// to the longest character length voiced under that prefix.
    prefixes: HashMap<String, usize>,
}

impl ConferencePolicy {
    pub fn new(tuning: ConferenceTuning) -> Self {
        Self {
            tuning,
            spoken: SpokenLog::new(),
            prefixes: HashMap::new(),
        }
    }

    fn prefix_key(sentence: &str) -> String {
        normalize(sentence)
            .split_whitespace()
            .take(5)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A sentence re-using a known prefix must have grown meaningfully,
    /// otherwise it is a re-delivery of something already voiced.
    fn passes_prefix_check(&self, sentence: &str) -> bool {
        let key = Self::prefix_key(sentence);
        match self.prefixes.get(&key) {
            Some(&stored_len) => {
                sentence.chars().count() as f64 > stored_len as f64 * self.tuning.prefix_growth_factor
            }
            None => true,
        }
    }
}

impl SegmentationPolicy for ConferencePolicy {
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit> {
        if !is_final {
            return Vec::new();
        }

        let (mut sentences, remainder) = split_complete_sentences(text);
        if !remainder.trim().is_empty() {
            sentences.push(remainder);
        }

        let mut out = Vec::new();
        for sentence in sentences {
            if word_count(&sentence) < self.tuning.min_words {
                continue;
            }
            if self.spoken.contains(Fingerprint::of(&sentence)) {
                continue;
            }
            if !self.passes_prefix_check(&sentence) {
                continue;
            }
            if self.spoken.is_similar(&sentence, self.tuning.jaccard_threshold) {
                continue;
            }

            let key = Self::prefix_key(&sentence);
            let len = sentence.chars().count();
            let entry = self.prefixes.entry(key).or_insert(0);
            *entry = (*entry).max(len);

            self.spoken.record(&sentence);
            out.push(SynthesisUnit::utterance(sentence, true));
        }
        out
    }

    fn poll(&mut self) -> Vec<SynthesisUnit> {
        Vec::new()
    }

    fn reset(&mut self) {
        self.spoken.clear();
        self.prefixes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ConferencePolicy {
        ConferencePolicy::new(ConferenceTuning::default())
    }

    #[test]
    fn test_minimum_length_is_five_words() {
        let mut p = policy();
        assert!(p.on_text("Welcome everyone to today.", true).is_empty());
        assert_eq!(
            p.on_text("Welcome everyone to today's keynote session.", true).len(),
            1
        );
    }

    #[test]
    fn test_prefix_rejects_short_regrowth() {
        let mut p = policy();
        let first = "The quarterly results show strong growth.";
        assert_eq!(p.on_text(first, true).len(), 1);

        // Same five-word prefix, not 1.2x longer: rejected.
        let redelivery = "The quarterly results show strong growth again.";
        assert!(p.on_text(redelivery, true).is_empty());
    }

    #[test]
    fn test_prefix_allows_substantial_growth() {
        let mut p = policy();
        assert_eq!(
            p.on_text("The quarterly results show strong growth.", true).len(),
            1
        );
        let grown = "The quarterly results show strong growth across every one of our \
                     regional markets and all product categories this year.";
        assert_eq!(p.on_text(grown, true).len(), 1);
    }

    #[test]
    fn test_jaccard_rejects_near_duplicates() {
        let mut p = policy();
        assert_eq!(
            p.on_text("Our customers reported record satisfaction levels.", true).len(),
            1
        );
        assert!(p
            .on_text("Our customers reported the record satisfaction levels.", true)
            .is_empty());
    }

    #[test]
    fn test_partials_ignored() {
        let mut p = policy();
        assert!(p
            .on_text("Welcome everyone to today's keynote session.", false)
            .is_empty());
    }
}
