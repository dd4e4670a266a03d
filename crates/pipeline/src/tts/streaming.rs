//! Persistent-mode synthesis channel
//!
//! Under the continuous-streaming policy each (session, language) holds
//! one long-lived bidirectional WebSocket to the synthesis provider: text
//! deltas go out as they arrive, audio fragments come back as the
//! provider produces them. An idle timer closes out a phrase when the
//! text side goes quiet; a dropped connection reopens with exponential
//! backoff; an unrecoverable channel falls back to request-mode
//! synthesis of accumulated phrases.
//!
//! Back-pressure: deltas travel over a bounded channel, so a stalled
//! provider pauses the sender instead of losing bytes mid-utterance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use relay_config::TtsSettings;
use relay_core::RelayMetrics;

use super::{AudioChunk, TtsDispatcher};
use crate::PipelineError;

/// Give up on the channel after this many consecutive failed connects.
const MAX_CONNECT_FAILURES: u32 = 5;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct StreamDelta {
    text: String,
    flush: bool,
}

/// Handle to one persistent synthesis channel.
#[derive(Clone)]
pub struct StreamingTtsChannel {
    tx: mpsc::Sender<StreamDelta>,
}

impl StreamingTtsChannel {
    pub fn spawn(
        language: impl Into<String>,
        voice: Arc<RwLock<String>>,
        settings: TtsSettings,
        out: mpsc::Sender<AudioChunk>,
        metrics: Arc<RelayMetrics>,
        shutdown: watch::Receiver<bool>,
        fallback: Option<TtsDispatcher>,
    ) -> Self {
        // Small bound on purpose: provider-side back-pressure must reach
        // the segmentation side as a paused send, not as dropped bytes.
        let (tx, rx) = mpsc::channel(16);

        let task = ChannelTask {
            language: language.into(),
            voice,
            settings,
            out,
            metrics,
            fallback,
            sequence: AtomicU64::new(0),
        };
        tokio::spawn(task.run(rx, shutdown));

        Self { tx }
    }

    /// Forward one text delta. Awaits while the channel is saturated.
    pub async fn send(&self, text: impl Into<String>, is_final: bool) -> Result<(), PipelineError> {
        self.tx
            .send(StreamDelta {
                text: text.into(),
                flush: is_final,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }
}

// ── Wire frames ────────────────────────────────────────────────────

#[derive(Serialize)]
struct SetupFrame<'a> {
    setup: SetupPayload<'a>,
}

#[derive(Serialize)]
struct SetupPayload<'a> {
    language: &'a str,
    voice: &'a str,
    format: &'a str,
}

#[derive(Serialize)]
struct InputFrame<'a> {
    input: InputPayload<'a>,
}

#[derive(Serialize)]
struct InputPayload<'a> {
    text: &'a str,
    flush: bool,
}

#[derive(Deserialize)]
struct ProviderFrame {
    #[serde(default)]
    audio: Option<String>,
    #[serde(rename = "final", default)]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one provider text frame into audio bytes, if it carries any.
fn parse_audio_frame(raw: &str) -> Option<(Vec<u8>, bool)> {
    let frame: ProviderFrame = serde_json::from_str(raw).ok()?;
    if let Some(error) = frame.error {
        tracing::warn!(error = %error, "streaming synthesis provider reported an error");
        return None;
    }
    let audio = frame.audio?;
    let bytes = BASE64.decode(audio).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some((bytes, frame.is_final.unwrap_or(false)))
}

// ── Channel task ───────────────────────────────────────────────────

struct ChannelTask {
    language: String,
    voice: Arc<RwLock<String>>,
    settings: TtsSettings,
    out: mpsc::Sender<AudioChunk>,
    metrics: Arc<RelayMetrics>,
    fallback: Option<TtsDispatcher>,
    sequence: AtomicU64,
}

impl ChannelTask {
    async fn run(self, mut rx: mpsc::Receiver<StreamDelta>, mut shutdown: watch::Receiver<bool>) {
        let Some(endpoint) = self.settings.streaming.endpoint.clone() else {
            tracing::warn!(
                language = %self.language,
                "no streaming synthesis endpoint configured"
            );
            self.run_fallback(&mut rx, &mut shutdown).await;
            return;
        };

        let mut backoff = INITIAL_BACKOFF;
        let backoff_cap = Duration::from_millis(self.settings.streaming.reconnect_max_delay_ms);
        let mut failures = 0u32;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let ws = tokio::select! {
                result = connect_async(&endpoint) => result,
                _ = shutdown.changed() => return,
            };

            let ws = match ws {
                Ok((ws, _)) => ws,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        language = %self.language,
                        error = %e,
                        attempt = failures,
                        "streaming synthesis connect failed"
                    );
                    if failures >= MAX_CONNECT_FAILURES {
                        tracing::error!(
                            language = %self.language,
                            "streaming synthesis unrecoverable, switching to request mode"
                        );
                        self.run_fallback(&mut rx, &mut shutdown).await;
                        return;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(backoff_cap);
                    continue;
                }
            };

            failures = 0;
            backoff = INITIAL_BACKOFF;

            match self.serve_connection(ws, &mut rx, &mut shutdown).await {
                ConnectionEnd::Shutdown | ConnectionEnd::SenderGone => return,
                ConnectionEnd::Dropped => {
                    tracing::info!(language = %self.language, "streaming synthesis reconnecting");
                }
            }
        }
    }

    async fn serve_connection(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        rx: &mut mpsc::Receiver<StreamDelta>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConnectionEnd {
        let (mut sink, mut stream) = ws.split();

        let voice = self.voice.read().clone();
        let setup = SetupFrame {
            setup: SetupPayload {
                language: &self.language,
                voice: &voice,
                format: &self.settings.audio_format,
            },
        };
        let setup_json = match serde_json::to_string(&setup) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode setup frame");
                return ConnectionEnd::Dropped;
            }
        };
        if sink.send(Message::Text(setup_json)).await.is_err() {
            return ConnectionEnd::Dropped;
        }

        let idle_flush = Duration::from_millis(self.settings.streaming.idle_flush_ms);
        let idle = tokio::time::sleep(idle_flush);
        tokio::pin!(idle);
        let mut pending_phrase = false;

        loop {
            tokio::select! {
                delta = rx.recv() => {
                    let Some(delta) = delta else {
                        let _ = sink.send(Message::Close(None)).await;
                        return ConnectionEnd::SenderGone;
                    };
                    let frame = InputFrame {
                        input: InputPayload { text: &delta.text, flush: delta.flush },
                    };
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode input frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json)).await.is_err() {
                        return ConnectionEnd::Dropped;
                    }
                    pending_phrase = !delta.flush;
                    idle.as_mut().reset(Instant::now() + idle_flush);
                }

                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(raw))) => {
                            if let Some((bytes, is_final)) = parse_audio_frame(&raw) {
                                self.emit_audio(bytes, is_final).await;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if !bytes.is_empty() {
                                self.emit_audio(bytes, false).await;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Dropped,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "streaming synthesis read failed");
                            return ConnectionEnd::Dropped;
                        }
                    }
                }

                _ = &mut idle, if pending_phrase => {
                    // Text side went quiet: close the phrase so the
                    // provider voices what it has.
                    let frame = InputFrame { input: InputPayload { text: "", flush: true } };
                    if let Ok(json) = serde_json::to_string(&frame) {
                        if sink.send(Message::Text(json)).await.is_err() {
                            return ConnectionEnd::Dropped;
                        }
                    }
                    pending_phrase = false;
                }

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        return ConnectionEnd::Shutdown;
                    }
                }
            }
        }
    }

    async fn emit_audio(&self, bytes: Vec<u8>, is_final: bool) {
        self.metrics.utterance_voiced(false);
        let chunk = AudioChunk {
            language: self.language.clone(),
            bytes,
            format: self.settings.audio_format.clone(),
            text: None,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            confidence: None,
            is_final: Some(is_final),
            streaming: true,
        };
        if self.out.send(chunk).await.is_err() {
            tracing::debug!(language = %self.language, "audio fan-out closed");
        }
    }

    /// Request-mode degradation: accumulate deltas into phrases and queue
    /// each completed phrase on the request dispatcher.
    async fn run_fallback(
        &self,
        rx: &mut mpsc::Receiver<StreamDelta>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let Some(dispatcher) = &self.fallback else {
            tracing::error!(
                language = %self.language,
                "no request-mode fallback available, discarding deltas"
            );
            while rx.recv().await.is_some() {}
            return;
        };

        let idle_flush = Duration::from_millis(self.settings.streaming.idle_flush_ms);
        let mut phrase = String::new();

        loop {
            let delta = tokio::select! {
                delta = rx.recv() => delta,
                _ = tokio::time::sleep(idle_flush), if !phrase.is_empty() => {
                    let text = std::mem::take(&mut phrase);
                    let voice = self.voice.read().clone();
                    let _ = dispatcher.enqueue(text, voice, 1.0, false);
                    continue;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() { return; }
                    continue;
                }
            };

            let Some(delta) = delta else { return };
            phrase.push_str(&delta.text);
            if delta.flush && !phrase.trim().is_empty() {
                let text = std::mem::take(&mut phrase);
                let voice = self.voice.read().clone();
                let _ = dispatcher.enqueue(text, voice, 1.0, true);
            }
        }
    }
}

enum ConnectionEnd {
    Shutdown,
    Dropped,
    SenderGone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_frame() {
        let raw = format!(r#"{{"audio":"{}","final":true}}"#, BASE64.encode(b"xyz"));
        let (bytes, is_final) = parse_audio_frame(&raw).unwrap();
        assert_eq!(bytes, b"xyz");
        assert!(is_final);
    }

    #[test]
    fn test_parse_rejects_error_and_empty_frames() {
        assert!(parse_audio_frame(r#"{"error":"boom"}"#).is_none());
        assert!(parse_audio_frame(r#"{"done":true}"#).is_none());
        assert!(parse_audio_frame("not json").is_none());
        let empty = format!(r#"{{"audio":"{}"}}"#, BASE64.encode(b""));
        assert!(parse_audio_frame(&empty).is_none());
    }

    #[tokio::test]
    async fn test_fallback_mode_accumulates_phrases() {
        use crate::tts::{AudioPayload, SynthesisRequest, TtsError, TtsProvider};
        use async_trait::async_trait;

        struct EchoProvider;

        #[async_trait]
        impl TtsProvider for EchoProvider {
            fn name(&self) -> &str {
                "echo"
            }
            async fn synthesize(
                &self,
                request: &SynthesisRequest,
            ) -> Result<AudioPayload, TtsError> {
                Ok(AudioPayload {
                    bytes: request.text.as_bytes().to_vec(),
                    format: "mp3".to_string(),
                })
            }
        }

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (_sd_tx, sd_rx) = watch::channel(false);
        let metrics = Arc::new(RelayMetrics::new());
        let dispatcher = TtsDispatcher::spawn(
            "es",
            Some(Arc::new(EchoProvider)),
            None,
            TtsSettings::default(),
            out_tx.clone(),
            Arc::clone(&metrics),
            sd_rx.clone(),
        );

        // No streaming endpoint configured: the channel degrades to
        // request mode immediately.
        let channel = StreamingTtsChannel::spawn(
            "es",
            Arc::new(RwLock::new("voice".to_string())),
            TtsSettings::default(),
            out_tx,
            metrics,
            sd_rx,
            Some(dispatcher),
        );

        channel.send("Hola ", false).await.unwrap();
        channel.send("a todos.", true).await.unwrap();

        let chunk = out_rx.recv().await.unwrap();
        assert_eq!(chunk.bytes, b"Hola a todos.");
    }
}
