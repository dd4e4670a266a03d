//! Translation client and text shaping
//!
//! This crate owns everything that happens to text between the speaker's
//! recognizer and the segmentation engine:
//! - A translator abstraction with an HTTP client, pass-through mode,
//!   source-echo fallback, and a short-TTL cache
//! - A punctuation shaper for unpunctuated recognizer fragments
//! - Sentence extraction with abbreviation rejection

pub mod punctuate;
pub mod sentence;
pub mod translate;

pub use punctuate::PunctuationShaper;
pub use sentence::{ends_with_terminal, split_complete_sentences};
pub use translate::{
    create_translator, HttpTranslator, NoopTranslator, TranslationCache, TranslationService,
    Translator,
};

use thiserror::Error;

/// Translation errors
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Request(String),

    #[error("Translation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Translation timed out")]
    Timeout,

    #[error("Malformed translation response: {0}")]
    Malformed(String),
}
