//! Natural-phrase policy
//!
//! Emits phrase-sized chunks at linguistically preferred boundaries. An
//! initial delay gathers context before the first chunk; afterwards a
//! chunk fires once the buffer reaches the ideal size or after a short
//! quiescent gap. Finals flush whatever remains.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use relay_config::NaturalPhraseTuning;
use relay_core::{Fingerprint, SynthesisUnit};
use relay_text::sentence::ends_with_terminal;

use super::cursor::WordCursor;
use super::{SegmentationPolicy, SpokenLog};

static CONJUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["and", "but", "or", "because", "so", "while", "although", "however", "then"]
        .into_iter()
        .collect()
});

static PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["in", "on", "at", "with", "from", "to", "for", "of", "by", "about", "into", "over"]
        .into_iter()
        .collect()
});

static ARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| ["the", "a", "an"].into_iter().collect());

pub struct NaturalPhrasePolicy {
    tuning: NaturalPhraseTuning,
    spoken: SpokenLog,
    cursor: WordCursor,
    first_chunk_sent: bool,
    started_at: Option<Instant>,
    last_input: Option<Instant>,
}

impl NaturalPhrasePolicy {
    pub fn new(tuning: NaturalPhraseTuning) -> Self {
        Self {
            tuning,
            spoken: SpokenLog::new(),
            cursor: WordCursor::new(),
            first_chunk_sent: false,
            started_at: None,
            last_input: None,
        }
    }

    fn carve(&mut self, out: &mut Vec<SynthesisUnit>, is_final: bool) {
        let pending = self.cursor.pending();
        if pending.is_empty() {
            return;
        }

        let n = if pending.len() < self.tuning.min_words {
            // Only reachable on a final flush.
            pending.len()
        } else {
            choose_break(pending, &self.tuning)
        }
        .max(1);

        let words = self.cursor.consume(n);
        let chunk = words.join(" ");
        let fingerprint = Fingerprint::of(&chunk);
        if self.spoken.contains(fingerprint) {
            return;
        }
        self.spoken.record(&chunk);
        self.first_chunk_sent = true;
        out.push(SynthesisUnit::utterance(chunk, is_final));
    }

    fn initial_delay_pending(&self, now: Instant) -> bool {
        !self.first_chunk_sent
            && self.started_at.is_some_and(|t| {
                now.duration_since(t) < Duration::from_millis(self.tuning.initial_delay_ms)
            })
    }
}

impl SegmentationPolicy for NaturalPhrasePolicy {
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit> {
        let now = Instant::now();
        self.cursor.sync(text);
        self.started_at.get_or_insert(now);
        self.last_input = Some(now);

        let mut out = Vec::new();

        if is_final {
            while !self.cursor.pending().is_empty() {
                self.carve(&mut out, true);
            }
            self.cursor.reset();
            self.started_at = None;
            return out;
        }

        if self.initial_delay_pending(now) {
            return out;
        }

        while self.cursor.pending().len() >= self.tuning.ideal_words {
            self.carve(&mut out, false);
        }
        out
    }

    fn poll(&mut self) -> Vec<SynthesisUnit> {
        let now = Instant::now();
        let mut out = Vec::new();

        if self.cursor.pending().is_empty() || self.initial_delay_pending(now) {
            return out;
        }

        let quiet = self
            .last_input
            .is_some_and(|t| now.duration_since(t) >= Duration::from_millis(self.tuning.quiescent_delay_ms));
        if !quiet && self.first_chunk_sent {
            return out;
        }

        while self.cursor.pending().len() >= self.tuning.min_words {
            self.carve(&mut out, false);
        }
        out
    }

    fn reset(&mut self) {
        self.spoken.clear();
        self.cursor.reset();
        self.first_chunk_sent = false;
        self.started_at = None;
        self.last_input = None;
    }
}

/// Pick the break position (word count) in `[min_words, max_words]`.
///
/// Scores, strongest first: phrase-ending punctuation on the prior word,
/// clause punctuation on the prior word, a conjunction opening the next
/// chunk, a preposition opening the next chunk. Breaking right before an
/// article is penalized. Ties lean toward the ideal size.
fn choose_break(words: &[String], tuning: &NaturalPhraseTuning) -> usize {
    let upper = tuning.max_words.min(words.len());
    let mut best_n = tuning.ideal_words.min(upper);
    let mut best_score = f64::NEG_INFINITY;

    for n in tuning.min_words.max(1)..=upper {
        let mut score = 0.0;
        let prior = words[n - 1].as_str();

        if ends_with_terminal(prior) {
            score += 8.0;
        } else if prior.ends_with(',') || prior.ends_with(';') || prior.ends_with(':') {
            score += 5.0;
        }

        if let Some(next) = words.get(n) {
            let next = next.to_lowercase();
            if CONJUNCTIONS.contains(next.as_str()) {
                score += 3.0;
            } else if PREPOSITIONS.contains(next.as_str()) {
                score += 2.0;
            }
            if ARTICLES.contains(next.as_str()) {
                score -= 3.0;
            }
        }

        score -= (n as f64 - tuning.ideal_words as f64).abs() * 0.25;

        if score > best_score {
            best_score = score;
            best_n = n;
        }
    }

    best_n
}
