//! Layered configuration for the conference translation relay
//!
//! Settings load from an optional `relay.toml` file with `RELAY_`-prefixed
//! environment variables layered on top; every field carries a serde
//! default so a bare deployment starts with sensible values.

pub mod policy;
pub mod settings;

pub use policy::{
    ConferenceTuning, ContinuousTuning, FinalOnlyTuning, HybridTuning, NaturalPhraseTuning,
    PhraseModeTuning, SegmentationPolicyKind, SegmentationSettings, UltraLowLatencyTuning,
};
pub use settings::{
    ObservabilitySettings, ServerSettings, SessionSettings, Settings, SpeechTokenSettings,
    TranslatorProvider, TranslatorSettings, TtsProviderSettings, TtsSettings, TtsStreamingSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
