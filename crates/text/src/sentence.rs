//! Sentence extraction
//!
//! Splits cumulative recognizer text into complete sentences at terminal
//! punctuation while rejecting boundaries inside known abbreviations and
//! decimal numbers. The trailing unterminated remainder is returned
//! separately so callers can keep it as pending text.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Terminal punctuation across the supported scripts.
const TERMINALS: &[char] = &['.', '!', '?', '؟', '。', '！', '？', '…'];

static ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "inc.", "ltd.", "co.",
        "corp.", "u.s.", "u.k.", "e.g.", "i.e.", "etc.", "vs.", "no.", "vol.", "approx.",
    ]
    .into_iter()
    .collect()
});

/// True when the text ends with terminal punctuation (ignoring trailing
/// whitespace and closing quotes).
pub fn ends_with_terminal(text: &str) -> bool {
    text.trim_end()
        .trim_end_matches(['"', '\'', ')', '»'])
        .chars()
        .next_back()
        .is_some_and(|c| TERMINALS.contains(&c))
}

/// Split `text` into complete sentences plus the unterminated remainder.
///
/// A '.' is not a boundary when it closes a known abbreviation or sits
/// between digits.
pub fn split_complete_sentences(text: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut start = 0usize;

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (idx, &(pos, c)) in chars.iter().enumerate() {
        if !TERMINALS.contains(&c) {
            continue;
        }

        let end = pos + c.len_utf8();

        if c == '.' {
            // Decimal number: digit on both sides.
            let prev_digit = idx > 0 && chars[idx - 1].1.is_ascii_digit();
            let next_digit = chars.get(idx + 1).is_some_and(|&(_, n)| n.is_ascii_digit());
            if prev_digit && next_digit {
                continue;
            }
            if is_abbreviation(&text[start..end]) {
                continue;
            }
            // A dotted initialism keeps going: "U.S." must not split at
            // the interior period.
            if chars.get(idx + 1).is_some_and(|&(_, n)| n.is_alphabetic())
                && idx > 0
                && chars[idx - 1].1.is_uppercase()
            {
                continue;
            }
        }

        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = end;
    }

    (sentences, text[start..].trim_start().to_string())
}

/// Check whether the clause ending at a '.' closes a known abbreviation.
fn is_abbreviation(clause: &str) -> bool {
    let last_word = clause
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("");
    if last_word.is_empty() {
        return false;
    }
    ABBREVIATIONS.contains(last_word.to_ascii_lowercase().as_str())
}

/// Word count helper shared by the policies.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split() {
        let (sentences, rest) = split_complete_sentences("Hello. How are you? I'm fine");
        assert_eq!(sentences, vec!["Hello.", "How are you?"]);
        assert_eq!(rest, "I'm fine");
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let (sentences, rest) = split_complete_sentences("Dr. Smith arrived. He sat down.");
        assert_eq!(sentences, vec!["Dr. Smith arrived.", "He sat down."]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_initialism_does_not_split() {
        let (sentences, _) = split_complete_sentences("The U.S. economy grew. Markets rose.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("U.S."));
    }

    #[test]
    fn test_decimal_does_not_split() {
        let (sentences, rest) = split_complete_sentences("Growth hit 3.5 percent");
        assert!(sentences.is_empty());
        assert_eq!(rest, "Growth hit 3.5 percent");
    }

    #[test]
    fn test_cjk_and_arabic_terminals() {
        let (sentences, _) = split_complete_sentences("你好。هل أنت بخير؟");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_ends_with_terminal() {
        assert!(ends_with_terminal("Done."));
        assert!(ends_with_terminal("Really?! "));
        assert!(!ends_with_terminal("Pending"));
        assert!(ends_with_terminal("He said \"stop.\""));
    }
}
