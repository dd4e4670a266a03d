//! Ultra-low-latency policy
//!
//! Emits small word chunks as soon as a handful of new words exist,
//! preferring any clause or terminal punctuation inside the window.
//! Without a boundary, a chunk goes out at the hard word bound or after a
//! short wait. Finals flush the remainder.

use std::time::{Duration, Instant};

use relay_config::UltraLowLatencyTuning;
use relay_core::{Fingerprint, SynthesisUnit};
use relay_text::sentence::ends_with_terminal;

use super::cursor::WordCursor;
use super::{SegmentationPolicy, SpokenLog};

pub struct UltraLowLatencyPolicy {
    tuning: UltraLowLatencyTuning,
    spoken: SpokenLog,
    cursor: WordCursor,
    last_input: Option<Instant>,
}

impl UltraLowLatencyPolicy {
    pub fn new(tuning: UltraLowLatencyTuning) -> Self {
        Self {
            tuning,
            spoken: SpokenLog::new(),
            cursor: WordCursor::new(),
            last_input: None,
        }
    }

    fn min_words(&self) -> usize {
        self.tuning.min_words.max(1)
    }

    /// Earliest punctuation boundary in the window that yields a chunk of
    /// at least `min_words`.
    fn boundary_in_window(&self) -> Option<usize> {
        let pending = self.cursor.pending();
        let upper = self.tuning.max_words.min(pending.len());
        (self.min_words()..=upper).find(|&n| {
            let word = pending[n - 1].as_str();
            word.ends_with(',') || word.ends_with(';') || word.ends_with(':') || ends_with_terminal(word)
        })
    }

    fn emit_chunk(&mut self, n: usize, is_final: bool, out: &mut Vec<SynthesisUnit>) {
        let words = self.cursor.consume(n.max(1));
        if words.is_empty() {
            return;
        }
        let chunk = words.join(" ");
        let fingerprint = Fingerprint::of(&chunk);
        if self.spoken.contains(fingerprint) {
            return;
        }
        self.spoken.record(&chunk);
        out.push(SynthesisUnit::utterance(chunk, is_final));
    }

    fn drain_ready(&mut self, out: &mut Vec<SynthesisUnit>) {
        loop {
            if self.cursor.pending().len() < self.min_words() {
                return;
            }
            if let Some(n) = self.boundary_in_window() {
                self.emit_chunk(n, false, out);
            } else if self.cursor.pending().len() >= self.tuning.max_words {
                self.emit_chunk(self.tuning.max_words, false, out);
            } else {
                // No boundary and under the hard bound: the wait timer
                // decides.
                return;
            }
        }
    }
}

impl SegmentationPolicy for UltraLowLatencyPolicy {
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit> {
        let now = Instant::now();
        self.cursor.sync(text);
        self.last_input = Some(now);

        let mut out = Vec::new();

        if is_final {
            while !self.cursor.pending().is_empty() {
                let n = self
                    .boundary_in_window()
                    .unwrap_or_else(|| self.tuning.max_words.min(self.cursor.pending().len()));
                self.emit_chunk(n, true, &mut out);
            }
            self.cursor.reset();
            return out;
        }

        self.drain_ready(&mut out);
        out
    }

    fn poll(&mut self) -> Vec<SynthesisUnit> {
        let mut out = Vec::new();
        let waited = self.last_input.is_some_and(|t| {
            Instant::now().duration_since(t) >= Duration::from_millis(self.tuning.boundary_wait_ms)
        });
        if !waited {
            return out;
        }

        while self.cursor.pending().len() >= self.min_words() {
            let n = self
                .boundary_in_window()
                .unwrap_or_else(|| self.tuning.max_words.min(self.cursor.pending().len()));
            self.emit_chunk(n, false, &mut out);
        }
        out
    }

    fn reset(&mut self) {
        self.spoken.clear();
        self.cursor.reset();
        self.last_input = None;
    }
}
