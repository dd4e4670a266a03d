//! Hybrid-stability policy
//!
//! Partials and finals both feed a table of candidate sentences extracted
//! from the current text. A candidate is voiced once it stabilizes:
//! seen often enough, committed by a final, or old enough while still
//! present. Candidates that vanish from the text before stabilizing were
//! provisional translations and are pruned.
//!
//! Under rapid partial bursts the policy shifts into phrase mode:
//! extraction splits at clause boundaries (or a word cap) and the
//! stability bar drops so clauses are voiced as they appear.

use std::time::{Duration, Instant};

use relay_config::HybridTuning;
use relay_core::{Fingerprint, SynthesisUnit, Utterance};
use relay_text::sentence::{ends_with_terminal, split_complete_sentences, word_count};

use super::{SegmentationPolicy, SpokenLog};

#[derive(Debug)]
struct Candidate {
    text: String,
    fingerprint: Fingerprint,
    first_seen: Instant,
    last_seen: Instant,
    appearances: u32,
    terminal: bool,
}

pub struct HybridPolicy {
    tuning: HybridTuning,
    spoken: SpokenLog,
    /// Insertion-ordered so stable candidates are voiced in the order
    /// they first appeared.
    candidates: Vec<Candidate>,
    /// Timestamps of recent partials, for burst detection.
    partial_times: Vec<Instant>,
    burst_since: Option<Instant>,
    phrase_mode: bool,
    last_event: Option<Instant>,
    partial_counter: u64,
}

impl HybridPolicy {
    pub fn new(tuning: HybridTuning) -> Self {
        Self {
            tuning,
            spoken: SpokenLog::new(),
            candidates: Vec::new(),
            partial_times: Vec::new(),
            burst_since: None,
            phrase_mode: false,
            last_event: None,
            partial_counter: 0,
        }
    }

    fn threshold(&self) -> u32 {
        if self.phrase_mode || self.tuning.latency_first {
            1
        } else {
            self.tuning.threshold.max(1)
        }
    }

    fn time_window(&self) -> Duration {
        if self.phrase_mode {
            Duration::from_millis(self.tuning.phrase_mode.time_window_ms)
        } else {
            Duration::from_millis(self.tuning.time_window_ms)
        }
    }

    fn update_burst_state(&mut self, now: Instant, is_final: bool) {
        let pause = Duration::from_millis(self.tuning.phrase_mode.deactivate_pause_ms);
        if let Some(last) = self.last_event {
            if now.duration_since(last) > pause {
                self.phrase_mode = false;
                self.burst_since = None;
                self.partial_times.clear();
            }
        }

        if is_final {
            return;
        }

        self.partial_times.push(now);
        self.partial_times
            .retain(|t| now.duration_since(*t) <= Duration::from_secs(1));

        let rate = self.partial_times.len() as f64;
        if rate > self.tuning.phrase_mode.activate_rate_per_sec {
            let since = *self.burst_since.get_or_insert(now);
            if now.duration_since(since)
                >= Duration::from_millis(self.tuning.phrase_mode.activate_sustain_ms)
                && !self.phrase_mode
            {
                tracing::debug!("rapid partials sustained, entering phrase mode");
                self.phrase_mode = true;
            }
        } else {
            self.burst_since = None;
        }
    }

    /// Candidate texts present in the current transcript.
    fn extract(&self, text: &str, is_final: bool) -> Vec<String> {
        if self.phrase_mode {
            extract_clauses(text, self.tuning.phrase_mode.max_words, is_final)
        } else {
            let (mut sentences, remainder) = split_complete_sentences(text);
            if is_final && !remainder.trim().is_empty() {
                sentences.push(remainder);
            }
            sentences.retain(|s| word_count(s) >= 2);
            sentences
        }
    }

    fn observe(&mut self, extracted: &[String], now: Instant) {
        for text in extracted {
            let fingerprint = Fingerprint::of(text);
            if self.spoken.contains(fingerprint) {
                continue;
            }
            match self
                .candidates
                .iter_mut()
                .find(|c| c.fingerprint == fingerprint)
            {
                Some(c) => {
                    c.last_seen = now;
                    c.appearances += 1;
                    // Keep the latest surface form; casing or punctuation
                    // may differ while the fingerprint stays fixed.
                    c.text = text.clone();
                    c.terminal = ends_with_terminal(text);
                }
                None => self.candidates.push(Candidate {
                    fingerprint,
                    first_seen: now,
                    last_seen: now,
                    appearances: 1,
                    terminal: ends_with_terminal(text),
                    text: text.clone(),
                }),
            }
        }
    }

    fn collect_stable(&mut self, now: Instant, is_final: bool) -> Vec<SynthesisUnit> {
        let threshold = self.threshold();
        let window = self.time_window();
        let mut out = Vec::new();

        let mut i = 0;
        while i < self.candidates.len() {
            let c = &self.candidates[i];
            let age = now.duration_since(c.first_seen);
            let stable = c.appearances >= threshold
                || (is_final && c.appearances >= 1)
                || (age > window && c.appearances >= 2);

            if stable {
                let c = self.candidates.remove(i);
                if self.spoken.contains(c.fingerprint) {
                    continue;
                }
                let confidence = 0.5
                    * (c.appearances as f64 / threshold as f64).min(1.0)
                    + 0.3 * (age.as_secs_f64() / window.as_secs_f64().max(f64::EPSILON)).min(1.0)
                    + if c.terminal { 0.2 } else { 0.1 };
                self.spoken.record(&c.text);
                out.push(SynthesisUnit::Utterance(
                    Utterance::new(c.text, is_final).with_confidence(confidence),
                ));
            } else {
                i += 1;
            }
        }
        out
    }

    /// Drop sub-threshold candidates that no longer appear in the text:
    /// they were provisional translations superseded by a revision.
    fn prune_revisions(&mut self, current: &[String], now: Instant) {
        let grace = Duration::from_millis(self.tuning.revision_grace_ms);
        let threshold = self.threshold();
        self.candidates.retain(|c| {
            let present = current
                .iter()
                .any(|t| Fingerprint::of(t) == c.fingerprint);
            if present {
                return true;
            }
            let keep = now.duration_since(c.last_seen) <= grace || c.appearances >= threshold;
            if !keep {
                tracing::trace!(text = %c.text, "pruning withdrawn candidate");
            }
            keep
        });
    }
}

impl SegmentationPolicy for HybridPolicy {
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit> {
        let now = Instant::now();
        self.update_burst_state(now, is_final);
        self.last_event = Some(now);
        if !is_final {
            self.partial_counter += 1;
        }

        let extracted = self.extract(text, is_final);
        self.observe(&extracted, now);
        self.prune_revisions(&extracted, now);
        let out = self.collect_stable(now, is_final);

        if is_final {
            // The recognizer starts a fresh cumulative text after a final;
            // whatever did not stabilize from this one is gone.
            self.candidates.clear();
            self.partial_counter = 0;
        }
        out
    }

    fn poll(&mut self) -> Vec<SynthesisUnit> {
        let now = Instant::now();

        let pause = Duration::from_millis(self.tuning.phrase_mode.deactivate_pause_ms);
        if self.phrase_mode
            && self
                .last_event
                .is_some_and(|last| now.duration_since(last) > pause)
        {
            self.phrase_mode = false;
            self.burst_since = None;
            self.partial_times.clear();
        }

        if self.candidates.is_empty() {
            return Vec::new();
        }
        let out = self.collect_stable(now, false);
        self.prune_revisions(&[], now);
        out
    }

    fn reset(&mut self) {
        self.spoken.clear();
        self.candidates.clear();
        self.partial_times.clear();
        self.burst_since = None;
        self.phrase_mode = false;
        self.last_event = None;
        self.partial_counter = 0;
    }
}

/// Clause extraction for phrase mode: split at commas, semicolons, and
/// terminals; cap clause length when no punctuation shows up. The
/// trailing unpunctuated clause is withheld unless the text is final.
fn extract_clauses(text: &str, max_words: usize, is_final: bool) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);

        let boundary = word.ends_with(',')
            || word.ends_with(';')
            || word.ends_with(':')
            || ends_with_terminal(word)
            || word_count(&current) >= max_words.max(2);

        if boundary {
            clauses.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() && is_final {
        clauses.push(current);
    }

    clauses.retain(|c| word_count(c) >= 1);
    clauses
}
