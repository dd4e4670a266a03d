//! Final-only policy
//!
//! Only committed transcripts reach synthesis. Highest quality, lowest
//! repetition, highest latency.

use relay_config::FinalOnlyTuning;
use relay_core::SynthesisUnit;
use relay_text::sentence::{split_complete_sentences, word_count};

use super::{SegmentationPolicy, SpokenLog};

pub struct FinalOnlyPolicy {
    tuning: FinalOnlyTuning,
    spoken: SpokenLog,
}

impl FinalOnlyPolicy {
    pub fn new(tuning: FinalOnlyTuning) -> Self {
        Self {
            tuning,
            spoken: SpokenLog::new(),
        }
    }
}

impl SegmentationPolicy for FinalOnlyPolicy {
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
            if self.spoken.is_duplicate(&sentence, self.tuning.jaccard_threshold) {
                continue;
            }
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FinalOnlyPolicy {
        FinalOnlyPolicy::new(FinalOnlyTuning::default())
    }

    #[test]
    fn test_partials_are_ignored() {
        let mut p = policy();
        assert!(p.on_text("Hello everyone at this", false).is_empty());
        assert!(p.on_text("Hello everyone at this conference.", false).is_empty());
    }

    #[test]
    fn test_multi_sentence_final() {
        let mut p = policy();
        let units = p.on_text("Hello there everyone. How are you today? I'm fine, thank you.", true);
        let texts: Vec<&str> = units.iter().map(|u| u.text()).collect();
        assert_eq!(
            texts,
            vec![
                "Hello there everyone.",
                "How are you today?",
                "I'm fine, thank you."
            ]
        );
    }

    #[test]
    fn test_short_fragments_rejected() {
        let mut p = policy();
        assert!(p.on_text("Thank you.", true).is_empty());
    }

    #[test]
    fn test_duplicate_final_suppressed() {
        let mut p = policy();
        assert_eq!(p.on_text("We begin the session now.", true).len(), 1);
        assert!(p.on_text("We begin the session now.", true).is_empty());
        // Near-identical rephrasing also suppressed by similarity.
        assert!(p.on_text("we begin the session now", true).is_empty());
    }

    #[test]
    fn test_unterminated_final_flushes() {
        let mut p = policy();
        let units = p.on_text("closing words without punctuation here", true);
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_abbreviation_not_split() {
        let mut p = policy();
        let units = p.on_text("Dr. Smith will speak next session.", true);
        assert_eq!(units.len(), 1);
        assert!(units[0].text().contains("Dr. Smith"));
    }
}
