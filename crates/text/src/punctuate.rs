//! Punctuation shaping for recognizer fragments
//!
//! Speech recognizers emit mostly unpunctuated text; synthesis sounds flat
//! without clause pauses and sentence-final intonation. The shaper inserts
//! commas at clause boundaries and infers terminal punctuation from simple
//! lexical cues. Heuristics only — a wrong comma is cheaper than a missing
//! pause.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::sentence::ends_with_terminal;

/// Conjunctions that open a long clause and take a comma before them.
static CLAUSE_CONJUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["however", "although", "because", "while", "after", "before", "but"]
        .into_iter()
        .collect()
});

/// Filler phrases that take a trailing comma, longest first so multi-word
/// fillers win over their prefixes.
const FILLERS: &[&str] = &[
    "you know",
    "i mean",
    "i think",
    "i guess",
    "vous savez",
    "je pense",
    "euh",
    "uh",
    "um",
    "hmm",
    "well",
];

static QUESTION_OPENERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "what", "who", "where", "when", "why", "how", "which", "whose", "is", "are", "was",
        "were", "do", "does", "did", "can", "could", "would", "should", "will", "shall", "have",
        "has", "am",
    ]
    .into_iter()
    .collect()
});

static EXCLAMATION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "wow",
        "amazing",
        "incredible",
        "fantastic",
        "excellent",
        "congratulations",
        "bravo",
        "unbelievable",
    ]
    .into_iter()
    .collect()
});

/// Words that often close a spoken sentence.
static CLOSER_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "today", "tomorrow", "yesterday", "soon", "now", "please", "thanks", "everyone",
        "everybody", "here", "there",
    ]
    .into_iter()
    .collect()
});

static SUBJECT_PRONOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["i", "you", "he", "she", "it", "we", "they", "this", "that"]
        .into_iter()
        .collect()
});

/// Punctuation shaper. Stateless; one instance serves all sessions.
#[derive(Debug, Default)]
pub struct PunctuationShaper;

impl PunctuationShaper {
    pub fn new() -> Self {
        Self
    }

    /// Shape one fragment. Finals always receive a terminal; partials only
    /// when the fragment looks complete.
    pub fn shape(&self, text: &str, is_final: bool) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let mut shaped = insert_clause_commas(trimmed);
        shaped = insert_filler_commas(&shaped);

        if !ends_with_terminal(&shaped) && (is_final || looks_complete(&shaped)) {
            shaped.push(infer_terminal(&shaped));
        }

        shaped
    }
}

fn insert_clause_commas(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            let lower = trim_word(word);
            let prev = words[i - 1];
            let prev_closed = prev.ends_with(',')
                || prev.ends_with(';')
                || prev.ends_with(':')
                || ends_with_terminal(prev);

            let wants_comma = if CLAUSE_CONJUNCTIONS.contains(lower.as_str()) {
                // Mid-sentence only: a leading conjunction takes no comma.
                i >= 2
            } else {
                lower == "and" && i >= 7
            };

            if wants_comma && !prev_closed {
                out.push(',');
            }
            out.push(' ');
        }
        out.push_str(word);
    }

    out
}

fn insert_filler_commas(text: &str) -> String {
    let lower = text.to_lowercase();
    for filler in FILLERS {
        // Only shape a filler that opens the fragment; mid-sentence
        // occurrences are too often load-bearing words.
        if lower.starts_with(filler) {
            let rest = &text[filler.len()..];
            if rest.starts_with(' ') && !text[..filler.len()].ends_with(',') {
                return format!("{},{}", &text[..filler.len()], rest);
            }
        }
    }
    text.to_string()
}

fn infer_terminal(text: &str) -> char {
    let words: Vec<String> = text.split_whitespace().map(trim_word).collect();
    let Some(first) = words.first() else {
        return '.';
    };

    if QUESTION_OPENERS.contains(first.as_str()) {
        return '?';
    }
    if words.iter().any(|w| EXCLAMATION_WORDS.contains(w.as_str())) {
        return '!';
    }
    '.'
}

/// A partial looks complete when it is long enough, or shorter but shaped
/// like a clause with a subject and a verb, or ends in a closing word.
fn looks_complete(text: &str) -> bool {
    let words: Vec<String> = text.split_whitespace().map(trim_word).collect();
    let n = words.len();

    if n >= 7 {
        return true;
    }
    if n >= 6 && has_subject_and_verb(&words) {
        return true;
    }
    n >= 4 && words.last().is_some_and(|w| CLOSER_WORDS.contains(w.as_str()))
}

fn has_subject_and_verb(words: &[String]) -> bool {
    let has_subject = words.iter().any(|w| SUBJECT_PRONOUNS.contains(w.as_str()));
    let has_verb = words
        .iter()
        .any(|w| w.len() > 3 && (w.ends_with("ed") || w.ends_with("ing") || w.ends_with('s')));
    has_subject && has_verb
}

fn trim_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
