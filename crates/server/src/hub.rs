//! Session hub
//!
//! The registry of live sessions and the router between the speaker's
//! transcript stream and the listeners' text/audio streams. A session is
//! keyed by its four-character code, holds exactly one speaker, and dies
//! with the speaker's connection. Listener churn never touches
//! segmentation state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};

use relay_config::Settings;
use relay_core::{RelayMetrics, SessionCode};
use relay_pipeline::{
    spawn_language_pipeline, default_voice, AudioChunk, PipelineHandle, TtsProvider,
};
use relay_text::{PunctuationShaper, TranslationService};
use relay_transport::{AudioStreamPayload, ClientEvent, ServerEvent};

/// Connection identifier assigned at WebSocket accept.
pub type ConnId = String;

/// What a connection currently is, from the hub's point of view.
#[derive(Debug, Clone)]
enum ConnRole {
    Speaker(SessionCode),
    Listener(SessionCode),
}

/// One listener's live subscription state.
struct ListenerState {
    language: String,
    voice: Option<String>,
    sender: mpsc::Sender<ServerEvent>,
}

/// Listener registry shared between the session and its audio fan-out
/// task.
struct SessionShared {
    code: SessionCode,
    listeners: RwLock<HashMap<ConnId, ListenerState>>,
    metrics: Arc<RelayMetrics>,
}

impl SessionShared {
    /// Deliver an event to every listener currently on `language`.
    fn send_to_language(&self, language: &str, event: &ServerEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.values() {
            if listener.language == language {
                // A slow listener loses this frame rather than stalling
                // the session.
                if listener.sender.try_send(event.clone()).is_err() {
                    self.metrics.transport_error();
                }
            }
        }
    }

    fn send_to_all(&self, event: &ServerEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.values() {
            let _ = listener.sender.try_send(event.clone());
        }
    }

    fn listener_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .listeners
            .read()
            .values()
            .map(|l| l.language.clone())
            .collect();
        languages.sort();
        languages.dedup();
        languages
    }

    /// The voice every listener of `language` agrees on, if they do.
    fn voice_consensus(&self, language: &str) -> Option<String> {
        let listeners = self.listeners.read();
        let mut voices = listeners
            .values()
            .filter(|l| l.language == language)
            .map(|l| l.voice.as_deref());

        let first = voices.next()??;
        for voice in voices {
            if voice != Some(first) {
                return None;
            }
        }
        Some(first.to_string())
    }
}

/// One live session: a speaker, its listeners, and the per-language
/// pipelines born from its transcript stream.
pub struct Session {
    pub code: SessionCode,
    pub source_lang: String,
    speaker_conn: ConnId,
    speaker_sender: mpsc::Sender<ServerEvent>,
    declared_targets: Vec<String>,
    created_at: Instant,
    shared: Arc<SessionShared>,
    pipelines: Mutex<HashMap<String, PipelineHandle>>,
    partial_counter: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    audio_tx: mpsc::Sender<AudioChunk>,
}

impl Session {
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Declared target languages if any, else the distinct languages of
    /// the current listeners.
    fn effective_targets(&self) -> Vec<String> {
        if !self.declared_targets.is_empty() {
            return self.declared_targets.clone();
        }
        self.shared.listener_languages()
    }

    fn send_to_speaker(&self, event: ServerEvent) {
        let _ = self.speaker_sender.try_send(event);
    }
}

/// Process-wide session registry and event router.
pub struct SessionHub {
    settings: Arc<Settings>,
    metrics: Arc<RelayMetrics>,
    translator: Arc<TranslationService>,
    shaper: PunctuationShaper,
    tts_primary: Option<Arc<dyn TtsProvider>>,
    tts_secondary: Option<Arc<dyn TtsProvider>>,
    sessions: RwLock<HashMap<SessionCode, Arc<Session>>>,
    connections: RwLock<HashMap<ConnId, ConnRole>>,
}

impl SessionHub {
    pub fn new(
        settings: Arc<Settings>,
        metrics: Arc<RelayMetrics>,
        translator: Arc<TranslationService>,
        tts_primary: Option<Arc<dyn TtsProvider>>,
        tts_secondary: Option<Arc<dyn TtsProvider>>,
    ) -> Self {
        Self {
            settings,
            metrics,
            translator,
            shaper: PunctuationShaper::new(),
            tts_primary,
            tts_secondary,
            sessions: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn get_session(&self, code: &SessionCode) -> Option<Arc<Session>> {
        self.sessions.read().get(code).cloned()
    }

    /// Dispatch one decoded client event.
    pub async fn handle_event(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::SpeakerJoin {
                code,
                source_lang,
                target_langs,
                source_hint: _,
            } => {
                self.speaker_join(conn, sender, &code, source_lang, target_langs)
                    .await;
            }
            ClientEvent::Transcript {
                code,
                text,
                is_final,
                timestamp,
                translations,
                ..
            } => {
                self.transcript(conn, sender, &code, text, is_final, timestamp, translations)
                    .await;
            }
            ClientEvent::FinalTranscript {
                code,
                text,
                timestamp,
                translations,
                ..
            } => {
                self.transcript(conn, sender, &code, text, true, timestamp, translations)
                    .await;
            }
            ClientEvent::ListenerJoin { code, lang, voice } => {
                self.listener_join(conn, sender, &code, lang, voice);
            }
            ClientEvent::ChangeLanguage { code, lang } => {
                self.change_language(conn, sender, &code, lang);
            }
            ClientEvent::UpdateVoice { code, voice } => {
                self.update_voice(conn, sender, &code, voice);
            }
            ClientEvent::ListenerLeave { code } => {
                self.listener_leave(conn, &code);
            }
            ClientEvent::Ping => {
                let _ = sender.try_send(ServerEvent::Pong);
            }
        }
    }

    /// Transport-level disconnect.
    pub async fn handle_disconnect(&self, conn: &ConnId) {
        let role = self.connections.write().remove(conn);
        match role {
            Some(ConnRole::Speaker(code)) => {
                if let Some(session) = self.remove_session_of(&code, conn) {
                    self.teardown(session, true);
                }
            }
            Some(ConnRole::Listener(code)) => {
                if let Some(session) = self.get_session(&code) {
                    self.remove_listener(&session, conn);
                }
            }
            None => {}
        }
    }

    // ── Speaker side ──────────────────────────────────────────────

    async fn speaker_join(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        code: &str,
        source_lang: String,
        target_langs: Option<Vec<String>>,
    ) {
        // Malformed codes are dropped without a reply.
        let Ok(code) = SessionCode::parse(code) else {
            tracing::debug!(code, "ignoring speaker join with malformed code");
            return;
        };

        // A late speaker for a live code replaces the prior session.
        let prior = self.sessions.write().remove(&code);
        if let Some(prior) = prior {
            tracing::info!(code = %code, "replacing live speaker, tearing down prior session");
            self.connections.write().remove(&prior.speaker_conn);
            self.teardown(prior, true);
        }

        let (shutdown_tx, _) = watch::channel(false);
        let (audio_tx, audio_rx) = mpsc::channel(256);

        let shared = Arc::new(SessionShared {
            code: code.clone(),
            listeners: RwLock::new(HashMap::new()),
            metrics: Arc::clone(&self.metrics),
        });

        tokio::spawn(audio_fanout(
            Arc::clone(&shared),
            audio_rx,
            shutdown_tx.subscribe(),
        ));

        let session = Arc::new(Session {
            code: code.clone(),
            source_lang,
            speaker_conn: conn.clone(),
            speaker_sender: sender.clone(),
            declared_targets: target_langs
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.to_lowercase())
                .collect(),
            created_at: Instant::now(),
            shared,
            pipelines: Mutex::new(HashMap::new()),
            partial_counter: AtomicU64::new(0),
            shutdown_tx,
            audio_tx,
        });

        self.sessions.write().insert(code.clone(), Arc::clone(&session));
        self.connections
            .write()
            .insert(conn.clone(), ConnRole::Speaker(code.clone()));
        self.metrics.session_created();
        tracing::info!(code = %code, source = %session.source_lang, "session started");

        session.send_to_speaker(ServerEvent::Joined {
            ok: true,
            code: code.to_string(),
            mode: Some(self.settings.segmentation.policy.as_str().to_string()),
            available_languages: None,
            source_lang: Some(session.source_lang.clone()),
        });
        session.send_to_speaker(ServerEvent::SessionStarted {
            code: code.to_string(),
        });
        session.shared.send_to_all(&ServerEvent::SessionStarted {
            code: code.to_string(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn transcript(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        code: &str,
        text: String,
        is_final: bool,
        timestamp: Option<u64>,
        supplied: Option<HashMap<String, String>>,
    ) {
        let Some(session) = SessionCode::parse(code).ok().and_then(|c| self.get_session(&c))
        else {
            let _ = sender.try_send(ServerEvent::Error {
                message: format!("unknown session code: {code}"),
            });
            return;
        };
        if session.speaker_conn != *conn {
            tracing::debug!(code, "transcript from non-speaker connection ignored");
            return;
        }
        if text.trim().is_empty() {
            return;
        }

        let targets = session.effective_targets();
        if targets.is_empty() {
            return;
        }

        let started = Instant::now();
        let translations = match supplied {
            // Client-supplied translations bypass the translator; targets
            // it missed fall back to the source text.
            Some(mut supplied) => targets
                .iter()
                .map(|t| {
                    let value = supplied.remove(t).unwrap_or_else(|| text.clone());
                    (t.clone(), value)
                })
                .collect::<HashMap<_, _>>(),
            None => {
                self.translator
                    .translate(&text, &targets, Some(&session.source_lang))
                    .await
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.translation_done(latency_ms);
        crate::metrics::record_translation_latency(latency_ms as f64 / 1000.0);
        if is_final && latency_ms > self.settings.observability.high_latency_ms {
            self.metrics.high_latency_event();
            tracing::warn!(
                code = %session.code,
                latency_ms,
                "slow translation on a final transcript"
            );
        }

        let partial_number = session.partial_counter.fetch_add(1, Ordering::Relaxed);

        for (language, translated) in &translations {
            let shaped = self.shaper.shape(translated, is_final);
            if shaped.is_empty() {
                continue;
            }

            session.shared.send_to_language(
                language,
                &ServerEvent::TranslationUpdate {
                    text: shaped.clone(),
                    language: language.clone(),
                    is_final,
                    partial_number: Some(partial_number),
                },
            );

            let pipeline = self.pipeline_for(&session, language);
            if pipeline.submit(shaped, is_final).await.is_err() {
                tracing::warn!(code = %session.code, language, "language pipeline unavailable");
            }
        }

        session.send_to_speaker(ServerEvent::TranslationBroadcast {
            original: text,
            translations,
            is_final,
            timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64),
            latency_ms,
        });
    }

    /// Fetch or lazily create the pipeline for one target language.
    fn pipeline_for(&self, session: &Arc<Session>, language: &str) -> PipelineHandle {
        let mut pipelines = session.pipelines.lock();
        if let Some(handle) = pipelines.get(language) {
            return handle.clone();
        }

        tracing::info!(code = %session.code, language, "starting language pipeline");
        let voice = session.shared.voice_consensus(language);
        let handle = spawn_language_pipeline(
            language,
            self.settings.segmentation.clone(),
            self.settings.tts.clone(),
            voice,
            self.tts_primary.clone(),
            self.tts_secondary.clone(),
            session.audio_tx.clone(),
            Arc::clone(&self.metrics),
            session.shutdown_tx.subscribe(),
        );
        pipelines.insert(language.to_string(), handle.clone());
        handle
    }

    // ── Listener side ─────────────────────────────────────────────

    fn listener_join(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        code: &str,
        lang: String,
        voice: Option<String>,
    ) {
        let session = SessionCode::parse(code).ok().and_then(|c| self.get_session(&c));
        let Some(session) = session else {
            let _ = sender.try_send(ServerEvent::SessionNotFound {
                code: code.to_string(),
            });
            return;
        };

        let language = lang.to_lowercase();
        session.shared.listeners.write().insert(
            conn.clone(),
            ListenerState {
                language: language.clone(),
                voice,
                sender: sender.clone(),
            },
        );
        self.connections
            .write()
            .insert(conn.clone(), ConnRole::Listener(session.code.clone()));

        self.refresh_voice(&session, &language);

        let mut available = session.effective_targets();
        if !available.contains(&language) {
            available.push(language.clone());
            available.sort();
        }

        let _ = sender.try_send(ServerEvent::Joined {
            ok: true,
            code: session.code.to_string(),
            mode: None,
            available_languages: Some(available),
            source_lang: Some(session.source_lang.clone()),
        });
        tracing::info!(code = %session.code, language, "listener joined");
    }

    fn change_language(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        code: &str,
        lang: String,
    ) {
        let Some(session) = SessionCode::parse(code).ok().and_then(|c| self.get_session(&c))
        else {
            return;
        };

        let language = lang.to_lowercase();
        let previous = {
            let mut listeners = session.shared.listeners.write();
            let Some(listener) = listeners.get_mut(conn) else {
                return;
            };
            std::mem::replace(&mut listener.language, language.clone())
        };

        self.refresh_voice(&session, &previous);
        self.refresh_voice(&session, &language);

        let _ = sender.try_send(ServerEvent::LanguageChanged {
            lang: language.clone(),
        });
        tracing::debug!(code = %session.code, from = previous, to = language, "listener language changed");
    }

    fn update_voice(
        &self,
        conn: &ConnId,
        sender: &mpsc::Sender<ServerEvent>,
        code: &str,
        voice: String,
    ) {
        let Some(session) = SessionCode::parse(code).ok().and_then(|c| self.get_session(&c))
        else {
            return;
        };

        let language = {
            let mut listeners = session.shared.listeners.write();
            let Some(listener) = listeners.get_mut(conn) else {
                return;
            };
            listener.voice = Some(voice.clone());
            listener.language.clone()
        };

        self.refresh_voice(&session, &language);
        let _ = sender.try_send(ServerEvent::VoiceUpdated { voice });
    }

    fn listener_leave(&self, conn: &ConnId, code: &str) {
        if let Some(session) = SessionCode::parse(code).ok().and_then(|c| self.get_session(&c)) {
            self.remove_listener(&session, conn);
        }
        self.connections.write().remove(conn);
    }

    fn remove_listener(&self, session: &Arc<Session>, conn: &ConnId) {
        let removed = session.shared.listeners.write().remove(conn);
        if let Some(listener) = removed {
            self.refresh_voice(session, &listener.language);
            tracing::debug!(code = %session.code, language = listener.language, "listener left");
        }
    }

    /// Re-resolve the synthesis voice for one language after listener
    /// churn: unanimous preference wins, otherwise the per-language
    /// default.
    fn refresh_voice(&self, session: &Arc<Session>, language: &str) {
        let pipelines = session.pipelines.lock();
        if let Some(handle) = pipelines.get(language) {
            let voice = session
                .shared
                .voice_consensus(language)
                .unwrap_or_else(|| default_voice(language).to_string());
            handle.set_voice(voice);
        }
    }

    // ── Teardown ──────────────────────────────────────────────────

    fn remove_session_of(&self, code: &SessionCode, speaker: &ConnId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let owned_by_speaker = sessions
            .get(code)
            .is_some_and(|s| s.speaker_conn == *speaker);
        if owned_by_speaker {
            sessions.remove(code)
        } else {
            None
        }
    }

    /// Kill a session: stop every pipeline, queue, and persistent
    /// channel, then tell the members.
    fn teardown(&self, session: Arc<Session>, notify: bool) {
        let _ = session.shutdown_tx.send(true);
        session.pipelines.lock().clear();

        if notify {
            session.shared.send_to_all(&ServerEvent::SpeakerDisconnected {
                code: session.code.to_string(),
            });
        }

        let listener_conns: Vec<ConnId> =
            session.shared.listeners.read().keys().cloned().collect();
        {
            let mut connections = self.connections.write();
            for conn in listener_conns {
                connections.remove(&conn);
            }
        }
        session.shared.listeners.write().clear();

        tracing::info!(code = %session.code, "session torn down");
    }

    /// Periodically reap sessions that have no listeners and have
    /// outlived the staleness bound.
    pub fn start_reaper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let hub = Arc::clone(self);
        let interval = Duration::from_secs(hub.settings.sessions.reap_interval_secs);
        let stale_after = Duration::from_secs(hub.settings.sessions.stale_after_secs);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let stale: Vec<Arc<Session>> = {
                            let mut sessions = hub.sessions.write();
                            let codes: Vec<SessionCode> = sessions
                                .values()
                                .filter(|s| s.listener_count() == 0 && s.age() >= stale_after)
                                .map(|s| s.code.clone())
                                .collect();
                            codes.into_iter().filter_map(|c| sessions.remove(&c)).collect()
                        };
                        for session in stale {
                            tracing::info!(code = %session.code, "reaping stale session");
                            hub.connections.write().remove(&session.speaker_conn);
                            hub.teardown(session, false);
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        stop_tx
    }
}

/// Per-session audio fan-out: chunks from every language pipeline are
/// delivered, in arrival order, to the listeners on that language.
async fn audio_fanout(
    shared: Arc<SessionShared>,
    mut rx: mpsc::Receiver<AudioChunk>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let chunk = tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(chunk) => chunk,
                None => break,
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let mut payload = AudioStreamPayload::new(&chunk.bytes, chunk.format, chunk.language.clone());
        payload.text = chunk.text;
        payload.sequence = Some(chunk.sequence);
        payload.confidence = chunk.confidence;
        payload.is_stable = Some(true);
        payload.is_final = chunk.is_final;
        payload.streaming = chunk.streaming.then_some(true);

        shared.send_to_language(&chunk.language, &ServerEvent::AudioStream(payload));
    }

    tracing::debug!(code = %shared.code, "audio fan-out stopped");
}
