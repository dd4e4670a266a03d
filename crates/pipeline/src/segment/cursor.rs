//! Word cursor over a cumulative transcript
//!
//! The chunked policies consume the cumulative text word by word. The
//! cursor tracks how many leading words have been handed to synthesis and
//! re-syncs on revisions: when the new text diverges before the consumed
//! point, the consumed count falls back to the surviving common prefix.

#[derive(Debug, Default)]
pub(crate) struct WordCursor {
    words: Vec<String>,
    consumed: usize,
}

impl WordCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view of the cumulative text. Returns nothing; call
    /// [`pending`](Self::pending) for the unconsumed tail.
    pub fn sync(&mut self, text: &str) {
        let new_words: Vec<String> = text.split_whitespace().map(str::to_string).collect();

        let mut common = 0;
        while common < self.words.len()
            && common < new_words.len()
            && self.words[common] == new_words[common]
        {
            common += 1;
        }
        if common < self.consumed {
            self.consumed = common;
        }

        self.words = new_words;
    }

    pub fn pending(&self) -> &[String] {
        &self.words[self.consumed.min(self.words.len())..]
    }

    pub fn consume(&mut self, n: usize) -> Vec<String> {
        let end = (self.consumed + n).min(self.words.len());
        let taken = self.words[self.consumed..end].to_vec();
        self.consumed = end;
        taken
    }

    pub fn reset(&mut self) {
        self.words.clear();
        self.consumed = 0;
    }
}
