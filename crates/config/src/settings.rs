//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::policy::SegmentationSettings;
use crate::ConfigError;

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub translator: TranslatorSettings,

    #[serde(default)]
    pub tts: TtsSettings,

    #[serde(default)]
    pub segmentation: SegmentationSettings,

    #[serde(default)]
    pub sessions: SessionSettings,

    #[serde(default)]
    pub speech_token: SpeechTokenSettings,

    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Load from `relay.toml` (if present) with `RELAY_`-prefixed
    /// environment variables layered on top.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("relay.toml")
    }

    /// Load from an explicit file path plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Sanity-check values that would otherwise fail far from their cause.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tts.max_rate < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.max_rate".to_string(),
                message: "must be at least 1.0".to_string(),
            });
        }
        if self.tts.critical_queue_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.critical_queue_size".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.segmentation.natural_phrase.min_words > self.segmentation.natural_phrase.max_words {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.natural_phrase".to_string(),
                message: "min_words exceeds max_words".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Bound of the per-connection outbound frame queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            outbound_queue_size: default_outbound_queue(),
        }
    }
}

/// Translation provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorProvider {
    /// HTTP translation service.
    Http,
    /// Pass-through: every target receives the source text.
    #[default]
    Disabled,
}

/// Translator client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorSettings {
    #[serde(default)]
    pub provider: TranslatorProvider,

    /// Base URL of the translation service.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-batch call timeout (ms).
    #[serde(default = "default_translate_timeout_ms")]
    pub timeout_ms: u64,

    /// Language-detection call timeout (ms).
    #[serde(default = "default_detect_timeout_ms")]
    pub detect_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache entry lifetime (s).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            provider: TranslatorProvider::Disabled,
            endpoint: None,
            api_key: None,
            timeout_ms: default_translate_timeout_ms(),
            detect_timeout_ms: default_detect_timeout_ms(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// One request-mode synthesis provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TtsProviderSettings {
    /// Base URL of the synthesis service. Unset disables the provider.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

/// Persistent-channel synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsStreamingSettings {
    /// WebSocket URL of the streaming synthesis service.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Close out a phrase after this much quiet on the text side (ms).
    #[serde(default = "default_idle_flush_ms")]
    pub idle_flush_ms: u64,

    /// Cap for the exponential reconnect backoff (ms).
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_max_delay_ms: u64,
}

impl Default for TtsStreamingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            idle_flush_ms: default_idle_flush_ms(),
            reconnect_max_delay_ms: default_reconnect_cap_ms(),
        }
    }
}

/// Synthesis dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Lowest-latency provider, tried first.
    #[serde(default)]
    pub primary: TtsProviderSettings,

    /// Slower but steadier provider, used on primary failure.
    #[serde(default)]
    pub secondary: TtsProviderSettings,

    #[serde(default)]
    pub streaming: TtsStreamingSettings,

    /// Per-request synthesis timeout (ms).
    #[serde(default = "default_tts_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Audio container the providers emit.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Queue length above which the playback rate starts climbing.
    #[serde(default = "default_queue_threshold")]
    pub queue_threshold: usize,

    /// Rate increase per queued item above the threshold.
    #[serde(default = "default_rate_step")]
    pub rate_step: f64,

    /// Playback-rate ceiling.
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    /// Queue length considered saturated; 2x this triggers drops.
    #[serde(default = "default_critical_size")]
    pub critical_queue_size: usize,

    /// Consecutive failures after which a provider is benched.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// How long a benched provider stays out (s).
    #[serde(default = "default_provider_cooloff_secs")]
    pub provider_cooloff_secs: u64,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            primary: TtsProviderSettings::default(),
            secondary: TtsProviderSettings::default(),
            streaming: TtsStreamingSettings::default(),
            request_timeout_ms: default_tts_timeout_ms(),
            audio_format: default_audio_format(),
            queue_threshold: default_queue_threshold(),
            rate_step: default_rate_step(),
            max_rate: default_max_rate(),
            critical_queue_size: default_critical_size(),
            max_consecutive_errors: default_max_consecutive_errors(),
            provider_cooloff_secs: default_provider_cooloff_secs(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Listener-less sessions older than this are reaped (s).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Reaper wake-up interval (s).
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

/// Browser STT credential issuance. Opaque to the relay: the configured
/// issuer is called and its response forwarded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpeechTokenSettings {
    #[serde(default)]
    pub issuer_endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Final-transcript handling slower than this is logged (ms).
    #[serde(default = "default_high_latency_ms")]
    pub high_latency_ms: u64,

    /// Counter rollup period (s).
    #[serde(default = "default_rollup_secs")]
    pub rollup_interval_secs: u64,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            high_latency_ms: default_high_latency_ms(),
            rollup_interval_secs: default_rollup_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}
fn default_outbound_queue() -> usize {
    256
}
fn default_translate_timeout_ms() -> u64 {
    2000
}
fn default_detect_timeout_ms() -> u64 {
    1000
}
fn default_cache_ttl_secs() -> u64 {
    30
}
fn default_tts_timeout_ms() -> u64 {
    5000
}
fn default_audio_format() -> String {
    "mp3".to_string()
}
fn default_queue_threshold() -> usize {
    3
}
fn default_rate_step() -> f64 {
    0.05
}
fn default_max_rate() -> f64 {
    1.5
}
fn default_critical_size() -> usize {
    10
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_provider_cooloff_secs() -> u64 {
    60
}
fn default_stale_after_secs() -> u64 {
    1800
}
fn default_reap_interval_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_high_latency_ms() -> u64 {
    200
}
fn default_rollup_secs() -> u64 {
    3600
}
fn default_idle_flush_ms() -> u64 {
    500
}
fn default_reconnect_cap_ms() -> u64 {
    5000
}
