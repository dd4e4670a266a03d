//! Core types for the conference translation relay
//!
//! This crate provides foundational types used across all other crates:
//! - Transcript and synthesis-unit types
//! - Session code grammar
//! - Utterance fingerprinting and text normalization
//! - Error types

pub mod code;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod metrics;

pub use code::SessionCode;
pub use error::{Error, Result};
pub use event::{SynthesisUnit, TranscriptEvent, Utterance};
pub use fingerprint::{jaccard_similarity, normalize, Fingerprint};
pub use metrics::{MetricsSnapshot, RelayMetrics};
