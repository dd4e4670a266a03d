//! Per-(session, language) pipeline task
//!
//! One task per pair owns the segmentation policy and feeds the synthesis
//! side. Inputs arrive over a FIFO channel, so segmentation is serialized
//! without locks; a short ticker drives the policies' time-based
//! emissions. The task dies with the session's shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use relay_config::{SegmentationSettings, TtsSettings};
use relay_core::{RelayMetrics, SynthesisUnit};

use crate::segment::build_policy;
use crate::tts::{default_voice, AudioChunk, StreamingTtsChannel, TtsDispatcher, TtsProvider};
use crate::PipelineError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One translated transcript event entering a language pipeline.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub text: String,
    pub is_final: bool,
}

/// Handle held by the session for one language pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineInput>,
    voice: Arc<RwLock<String>>,
}

impl PipelineHandle {
    /// Feed one translated event. Awaits when the pipeline is saturated,
    /// preserving input order.
    pub async fn submit(&self, text: impl Into<String>, is_final: bool) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineInput {
                text: text.into(),
                is_final,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Update the synthesis voice for subsequent utterances.
    pub fn set_voice(&self, voice: impl Into<String>) {
        *self.voice.write() = voice.into();
    }

    pub fn voice(&self) -> String {
        self.voice.read().clone()
    }
}

/// Spawn the pipeline task for one (session, language).
#[allow(clippy::too_many_arguments)]
pub fn spawn_language_pipeline(
    language: impl Into<String>,
    segmentation: SegmentationSettings,
    tts: TtsSettings,
    initial_voice: Option<String>,
    primary: Option<Arc<dyn TtsProvider>>,
    secondary: Option<Arc<dyn TtsProvider>>,
    out: mpsc::Sender<AudioChunk>,
    metrics: Arc<RelayMetrics>,
    shutdown: watch::Receiver<bool>,
) -> PipelineHandle {
    let language = language.into();
    let voice = Arc::new(RwLock::new(
        initial_voice.unwrap_or_else(|| default_voice(&language).to_string()),
    ));

    let dispatcher = TtsDispatcher::spawn(
        language.clone(),
        primary,
        secondary,
        tts.clone(),
        out.clone(),
        Arc::clone(&metrics),
        shutdown.clone(),
    );

    let streaming = segmentation.policy.is_streaming().then(|| {
        StreamingTtsChannel::spawn(
            language.clone(),
            Arc::clone(&voice),
            tts,
            out,
            Arc::clone(&metrics),
            shutdown.clone(),
            Some(dispatcher.clone()),
        )
    });

    let (tx, rx) = mpsc::channel(64);
    let handle = PipelineHandle {
        tx,
        voice: Arc::clone(&voice),
    };

    tokio::spawn(pipeline_loop(
        language,
        segmentation,
        voice,
        dispatcher,
        streaming,
        rx,
        shutdown,
    ));

    handle
}

async fn pipeline_loop(
    language: String,
    segmentation: SegmentationSettings,
    voice: Arc<RwLock<String>>,
    dispatcher: TtsDispatcher,
    streaming: Option<StreamingTtsChannel>,
    mut rx: mpsc::Receiver<PipelineInput>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut policy = build_policy(&segmentation);
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let units = tokio::select! {
            input = rx.recv() => match input {
                Some(input) => policy.on_text(&input.text, input.is_final),
                None => break,
            },
            _ = tick.tick() => policy.poll(),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        for unit in units {
            match unit {
                SynthesisUnit::Utterance(u) => {
                    let done = dispatcher.enqueue(
                        u.text,
                        voice.read().clone(),
                        u.confidence,
                        u.is_final,
                    );
                    let lang = language.clone();
                    tokio::spawn(async move {
                        if let Ok(Err(e)) = done.await {
                            tracing::debug!(language = %lang, error = %e, "utterance not voiced");
                        }
                    });
                }
                SynthesisUnit::Delta { text, is_final } => {
                    if let Some(channel) = &streaming {
                        // Bounded send: provider back-pressure pauses this
                        // pipeline rather than dropping bytes.
                        if channel.send(text, is_final).await.is_err() {
                            tracing::debug!(language = %language, "streaming channel closed");
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(language = %language, "language pipeline stopped");
}
