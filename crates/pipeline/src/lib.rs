//! Segmentation engine and synthesis dispatch
//!
//! The per-(session, language) half of the relay: a policy-selectable
//! segmentation engine turns translated transcript streams into disjoint,
//! at-most-once-spoken synthesis units, and a dispatcher turns those units
//! into ordered audio via external synthesis providers.
//!
//! Each (session, language) pair owns exactly one pipeline task; the task
//! owns its policy state and its queue, so segmentation is serialized per
//! pair without any shared lock.

pub mod pipeline;
pub mod segment;
pub mod tts;

pub use pipeline::{spawn_language_pipeline, PipelineHandle, PipelineInput};
pub use segment::{build_policy, SegmentationPolicy, SpokenLog};
pub use tts::{
    default_voice, AudioChunk, AudioPayload, HttpTtsProvider, StreamingTtsChannel,
    SynthesisRequest, TtsDispatcher, TtsError, TtsProvider,
};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Shutdown")]
    Shutdown,
}
