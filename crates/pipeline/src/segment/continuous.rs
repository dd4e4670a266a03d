//! Continuous-streaming policy
//!
//! No utterance carving: a cursor tracks how much of the cumulative
//! translated text has been forwarded, and every sufficiently large new
//! suffix streams verbatim to the persistent synthesis channel. Prosody
//! is entirely the provider's problem.

use relay_config::ContinuousTuning;
use relay_core::SynthesisUnit;

use super::SegmentationPolicy;

pub struct ContinuousPolicy {
    tuning: ContinuousTuning,
    last_text: String,
    /// Byte offset into the cumulative text already forwarded.
    cursor: usize,
}

impl ContinuousPolicy {
    pub fn new(tuning: ContinuousTuning) -> Self {
        Self {
            tuning,
            last_text: String::new(),
            cursor: 0,
        }
    }
}

impl SegmentationPolicy for ContinuousPolicy {
    fn on_text(&mut self, text: &str, is_final: bool) -> Vec<SynthesisUnit> {
        // A revision rewinds the cursor to the surviving common prefix.
        let common = common_prefix_boundary(&self.last_text, text);
        if common < self.cursor {
            self.cursor = common;
        }
        self.last_text = text.to_string();

        let mut out = Vec::new();
        let delta = &text[self.cursor.min(text.len())..];

        if !delta.is_empty() && (delta.chars().count() >= self.tuning.min_delta_chars || is_final) {
            out.push(SynthesisUnit::Delta {
                text: delta.to_string(),
                is_final,
            });
            self.cursor = text.len();
        } else if is_final && delta.is_empty() {
            // Nothing new, but the channel still needs the phrase closed.
            out.push(SynthesisUnit::Delta {
                text: String::new(),
                is_final: true,
            });
        }

        if is_final {
            self.cursor = 0;
            self.last_text.clear();
        }
        out
    }

    fn poll(&mut self) -> Vec<SynthesisUnit> {
        Vec::new()
    }

    fn reset(&mut self) {
        self.last_text.clear();
        self.cursor = 0;
    }
}

/// Length of the common prefix of `a` and `b`, snapped to a char
/// boundary of `b`.
fn common_prefix_boundary(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let max = a_bytes.len().min(b_bytes.len());

    let mut common = 0;
    while common < max && a_bytes[common] == b_bytes[common] {
        common += 1;
    }
    while common > 0 && !b.is_char_boundary(common) {
        common -= 1;
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ContinuousPolicy {
        ContinuousPolicy::new(ContinuousTuning::default())
    }

    fn delta_text(unit: &SynthesisUnit) -> &str {
        match unit {
            SynthesisUnit::Delta { text, .. } => text,
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_deltas_cover_growing_text() {
        let mut p = policy();
        let first = p.on_text("Hola", false);
        assert_eq!(delta_text(&first[0]), "Hola");

        let second = p.on_text("Hola a todos", false);
        assert_eq!(delta_text(&second[0]), " a todos");
    }

    #[test]
    fn test_small_delta_waits() {
        let mut p = policy();
        p.on_text("Hola", false);
        // Two new characters: below the minimum.
        assert!(p.on_text("Hola a", false).is_empty());
        // Final forwards regardless of size.
        let units = p.on_text("Hola ab", true);
        assert_eq!(delta_text(&units[0]), " ab");
    }

    #[test]
    fn test_final_resets_cursor() {
        let mut p = policy();
        p.on_text("First phrase here", true);
        let units = p.on_text("Second", false);
        assert_eq!(delta_text(&units[0]), "Second");
    }

    #[test]
    fn test_revision_rewinds() {
        let mut p = policy();
        p.on_text("The cat", false);
        let units = p.on_text("The cats are here", false);
        assert_eq!(delta_text(&units[0]), "s are here");
    }

    #[test]
    fn test_final_with_no_new_text_flushes() {
        let mut p = policy();
        p.on_text("Complete phrase", false);
        let units = p.on_text("Complete phrase", true);
        assert_eq!(units.len(), 1);
        assert!(matches!(
            units[0],
            SynthesisUnit::Delta { ref text, is_final: true } if text.is_empty()
        ));
    }

    #[test]
    fn test_multibyte_revision_safe() {
        let mut p = policy();
        p.on_text("café au", false);
        let units = p.on_text("cafés au lait", false);
        assert!(!units.is_empty());
    }
}
