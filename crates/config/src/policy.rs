//! Segmentation policy selection and tuning
//!
//! Exactly one policy is active per deployment, selected by
//! [`SegmentationPolicyKind`]. Tuning knobs are grouped per policy so a
//! deployment only overrides the section for the policy it runs.

use serde::{Deserialize, Serialize};

/// The segmentation policy a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationPolicyKind {
    /// Synthesize only committed (final) transcripts, sentence by sentence.
    FinalOnly,
    /// Partials and finals feed a candidate table; candidates are voiced
    /// once they stabilize.
    #[default]
    Hybrid,
    /// Final-only with aggressive duplicate rejection, tuned for long
    /// conference monologues.
    Conference,
    /// Phrase-sized chunks at linguistically preferred boundaries.
    NaturalPhrase,
    /// Word chunks as soon as a handful of new words exist.
    UltraLowLatency,
    /// No carving; raw text deltas stream to a persistent synthesis channel.
    Continuous,
}

impl SegmentationPolicyKind {
    /// True when the dispatcher should hold a persistent bidirectional
    /// synthesis channel instead of a request queue.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Continuous)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FinalOnly => "final-only",
            Self::Hybrid => "hybrid",
            Self::Conference => "conference",
            Self::NaturalPhrase => "natural-phrase",
            Self::UltraLowLatency => "ultra-low-latency",
            Self::Continuous => "continuous",
        }
    }
}

/// Segmentation engine settings: policy selector plus per-policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SegmentationSettings {
    /// Active policy.
    #[serde(default)]
    pub policy: SegmentationPolicyKind,

    #[serde(default)]
    pub final_only: FinalOnlyTuning,

    #[serde(default)]
    pub hybrid: HybridTuning,

    #[serde(default)]
    pub conference: ConferenceTuning,

    #[serde(default)]
    pub natural_phrase: NaturalPhraseTuning,

    #[serde(default)]
    pub ultra_low_latency: UltraLowLatencyTuning,

    #[serde(default)]
    pub continuous: ContinuousTuning,
}

/// Final-only policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOnlyTuning {
    /// Sentences shorter than this many words are not voiced.
    #[serde(default = "default_min_words_final")]
    pub min_words: usize,

    /// Token-set similarity at or above this value counts as a duplicate.
    #[serde(default = "default_jaccard")]
    pub jaccard_threshold: f64,
}

impl Default for FinalOnlyTuning {
    fn default() -> Self {
        Self {
            min_words: default_min_words_final(),
            jaccard_threshold: default_jaccard(),
        }
    }
}

/// Hybrid-stability policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridTuning {
    /// Appearance count at which a candidate becomes stable.
    #[serde(default = "default_hybrid_threshold")]
    pub threshold: u32,

    /// Age past which a twice-seen candidate becomes stable (ms).
    #[serde(default = "default_hybrid_window_ms")]
    pub time_window_ms: u64,

    /// Latency-first tuning drops the appearance threshold to 1.
    #[serde(default)]
    pub latency_first: bool,

    /// Candidates absent from the current text for longer than this are
    /// treated as revisions and pruned (ms).
    #[serde(default = "default_revision_grace_ms")]
    pub revision_grace_ms: u64,

    #[serde(default)]
    pub phrase_mode: PhraseModeTuning,
}

impl Default for HybridTuning {
    fn default() -> Self {
        Self {
            threshold: default_hybrid_threshold(),
            time_window_ms: default_hybrid_window_ms(),
            latency_first: false,
            revision_grace_ms: default_revision_grace_ms(),
            phrase_mode: PhraseModeTuning::default(),
        }
    }
}

/// Adaptive phrase sub-mode of the hybrid policy: activated under rapid
/// partial bursts, extraction then splits on commas or a word cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseModeTuning {
    /// Partials per second that count as a burst.
    #[serde(default = "default_phrase_rate")]
    pub activate_rate_per_sec: f64,

    /// How long the burst must sustain before phrase mode engages (ms).
    #[serde(default = "default_phrase_sustain_ms")]
    pub activate_sustain_ms: u64,

    /// A pause longer than this deactivates phrase mode (ms).
    #[serde(default = "default_phrase_pause_ms")]
    pub deactivate_pause_ms: u64,

    /// Stability window while in phrase mode (ms).
    #[serde(default = "default_phrase_window_ms")]
    pub time_window_ms: u64,

    /// Split every this many words when no comma exists.
    #[serde(default = "default_phrase_max_words")]
    pub max_words: usize,
}

impl Default for PhraseModeTuning {
    fn default() -> Self {
        Self {
            activate_rate_per_sec: default_phrase_rate(),
            activate_sustain_ms: default_phrase_sustain_ms(),
            deactivate_pause_ms: default_phrase_pause_ms(),
            time_window_ms: default_phrase_window_ms(),
            max_words: default_phrase_max_words(),
        }
    }
}

/// Conference policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceTuning {
    /// Minimum sentence length in words.
    #[serde(default = "default_min_words_conference")]
    pub min_words: usize,

    /// A sentence sharing a five-word prefix with a prior one must be
    /// longer than the stored length times this factor to be voiced.
    #[serde(default = "default_prefix_growth")]
    pub prefix_growth_factor: f64,

    /// Similarity at or above this value against any prior utterance
    /// rejects the sentence.
    #[serde(default = "default_jaccard")]
    pub jaccard_threshold: f64,
}

impl Default for ConferenceTuning {
    fn default() -> Self {
        Self {
            min_words: default_min_words_conference(),
            prefix_growth_factor: default_prefix_growth(),
            jaccard_threshold: default_jaccard(),
        }
    }
}

/// Natural-phrase policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaturalPhraseTuning {
    #[serde(default = "default_natural_min")]
    pub min_words: usize,

    #[serde(default = "default_natural_ideal")]
    pub ideal_words: usize,

    #[serde(default = "default_natural_max")]
    pub max_words: usize,

    /// Context-gathering delay before the very first chunk (ms).
    #[serde(default = "default_natural_initial_ms")]
    pub initial_delay_ms: u64,

    /// Quiescence after which a pending chunk is released (ms).
    #[serde(default = "default_natural_quiescent_ms")]
    pub quiescent_delay_ms: u64,
}

impl Default for NaturalPhraseTuning {
    fn default() -> Self {
        Self {
            min_words: default_natural_min(),
            ideal_words: default_natural_ideal(),
            max_words: default_natural_max(),
            initial_delay_ms: default_natural_initial_ms(),
            quiescent_delay_ms: default_natural_quiescent_ms(),
        }
    }
}

/// Ultra-low-latency policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltraLowLatencyTuning {
    #[serde(default = "default_ultra_min")]
    pub min_words: usize,

    #[serde(default = "default_ultra_max")]
    pub max_words: usize,

    /// Wait for a boundary this long before emitting anyway (ms).
    #[serde(default = "default_ultra_wait_ms")]
    pub boundary_wait_ms: u64,
}

impl Default for UltraLowLatencyTuning {
    fn default() -> Self {
        Self {
            min_words: default_ultra_min(),
            max_words: default_ultra_max(),
            boundary_wait_ms: default_ultra_wait_ms(),
        }
    }
}

/// Continuous-streaming policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuousTuning {
    /// Minimum delta length before a send (characters).
    #[serde(default = "default_continuous_min_chars")]
    pub min_delta_chars: usize,
}

impl Default for ContinuousTuning {
    fn default() -> Self {
        Self {
            min_delta_chars: default_continuous_min_chars(),
        }
    }
}

fn default_min_words_final() -> usize {
    3
}
fn default_min_words_conference() -> usize {
    5
}
fn default_jaccard() -> f64 {
    0.85
}
fn default_hybrid_threshold() -> u32 {
    2
}
fn default_hybrid_window_ms() -> u64 {
    1500
}
fn default_revision_grace_ms() -> u64 {
    1000
}
fn default_phrase_rate() -> f64 {
    3.0
}
fn default_phrase_sustain_ms() -> u64 {
    2000
}
fn default_phrase_pause_ms() -> u64 {
    900
}
fn default_phrase_window_ms() -> u64 {
    200
}
fn default_phrase_max_words() -> usize {
    8
}
fn default_prefix_growth() -> f64 {
    1.2
}
fn default_natural_min() -> usize {
    5
}
fn default_natural_ideal() -> usize {
    8
}
fn default_natural_max() -> usize {
    15
}
fn default_natural_initial_ms() -> u64 {
    150
}
fn default_natural_quiescent_ms() -> u64 {
    50
}
fn default_ultra_min() -> usize {
    3
}
fn default_ultra_max() -> usize {
    10
}
fn default_ultra_wait_ms() -> u64 {
    100
}
fn default_continuous_min_chars() -> usize {
    3
}
