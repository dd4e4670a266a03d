//! Utterance fingerprinting
//!
//! A fingerprint is a stable hash over a normalized form of an utterance
//! and is the unit of at-most-once voicing: once a fingerprint has been
//! sent to synthesis for a (session, language), it is never sent again.
//!
//! Normalization is case- and diacritic-insensitive: NFD decomposition,
//! combining marks stripped, lowercased, whitespace collapsed, and
//! non-alphanumeric characters dropped for comparison purposes.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Stable identity of a normalized utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint an utterance. Equal up to case, diacritics,
    /// punctuation, and whitespace differences.
    pub fn of(text: &str) -> Self {
        let normalized = normalize(text);
        let digest = Sha256::digest(normalized.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Normalize text for comparison: NFD, strip combining marks, lowercase,
/// drop non-alphanumerics, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;

    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
        // Everything else (punctuation, symbols) is dropped. A dropped
        // character does not break a word: "don't" and "dont" compare equal.
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Token-set Jaccard similarity over normalized text. Returns a value in
/// [0, 1]; 1.0 for identical token sets, 0.0 for disjoint or empty.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    let set_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let set_b: HashSet<&str> = norm_b.split_whitespace().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_punctuation() {
        assert_eq!(normalize("Hello, World!"), "hello world");
        assert_eq!(normalize("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_normalize_diacritics() {
        assert_eq!(normalize("Bienvenidos a la reunión."), normalize("bienvenidos a la reunion"));
        assert_eq!(normalize("café"), "cafe");
    }

    #[test]
    fn test_fingerprint_stability() {
        assert_eq!(Fingerprint::of("Hola a todos."), Fingerprint::of("hola a todos"));
        assert_ne!(Fingerprint::of("Hola a todos."), Fingerprint::of("Hola a todas."));
    }

    #[test]
    fn test_jaccard() {
        assert!(jaccard_similarity("the cat sat", "the cat sat") > 0.99);
        assert!(jaccard_similarity("the cat sat", "a dog ran off") < 0.2);
        let sim = jaccard_similarity("the quick brown fox jumps", "the quick brown fox jumped");
        assert!(sim > 0.5 && sim < 0.9);
    }
}
