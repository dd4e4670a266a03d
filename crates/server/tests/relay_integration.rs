//! End-to-end relay tests over the session hub with in-process fakes:
//! a pass-through translator and synthesis providers that echo text as
//! audio bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_config::{SegmentationPolicyKind, Settings};
use relay_core::RelayMetrics;
use relay_pipeline::{AudioPayload, SynthesisRequest, TtsError, TtsProvider};
use relay_server::SessionHub;
use relay_text::{NoopTranslator, TranslationService};
use relay_transport::{ClientEvent, ServerEvent};

struct EchoTts;

#[async_trait]
impl TtsProvider for EchoTts {
    fn name(&self) -> &str {
        "echo"
    }
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, TtsError> {
        Ok(AudioPayload {
            bytes: request.text.as_bytes().to_vec(),
            format: "mp3".to_string(),
        })
    }
}

struct SlowTts(Duration);

#[async_trait]
impl TtsProvider for SlowTts {
    fn name(&self) -> &str {
        "slow"
    }
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, TtsError> {
        tokio::time::sleep(self.0).await;
        Ok(AudioPayload {
            bytes: request.text.as_bytes().to_vec(),
            format: "mp3".to_string(),
        })
    }
}

struct Conn {
    id: String,
    tx: mpsc::Sender<ServerEvent>,
    rx: mpsc::Receiver<ServerEvent>,
}

fn conn(name: &str) -> Conn {
    let (tx, rx) = mpsc::channel(256);
    Conn {
        id: name.to_string(),
        tx,
        rx,
    }
}

fn build_hub(
    mut mutate: impl FnMut(&mut Settings),
    provider: Arc<dyn TtsProvider>,
) -> (Arc<SessionHub>, Arc<RelayMetrics>) {
    let mut settings = Settings::default();
    mutate(&mut settings);
    let settings = Arc::new(settings);
    let metrics = Arc::new(RelayMetrics::new());
    let translator = Arc::new(TranslationService::with_translator(
        Arc::new(NoopTranslator::new()),
        &settings.translator,
    ));
    let hub = Arc::new(SessionHub::new(
        Arc::clone(&settings),
        Arc::clone(&metrics),
        translator,
        Some(provider),
        None,
    ));
    (hub, metrics)
}

async fn join_speaker(hub: &SessionHub, speaker: &Conn, code: &str, source: &str) {
    hub.handle_event(
        &speaker.id,
        &speaker.tx,
        ClientEvent::SpeakerJoin {
            code: code.to_string(),
            source_lang: source.to_string(),
            target_langs: None,
            source_hint: None,
        },
    )
    .await;
}

async fn join_listener(hub: &SessionHub, listener: &Conn, code: &str, lang: &str) {
    hub.handle_event(
        &listener.id,
        &listener.tx,
        ClientEvent::ListenerJoin {
            code: code.to_string(),
            lang: lang.to_string(),
            voice: None,
        },
    )
    .await;
}

async fn send_transcript(
    hub: &SessionHub,
    speaker: &Conn,
    code: &str,
    text: &str,
    is_final: bool,
    translations: Option<HashMap<String, String>>,
) {
    hub.handle_event(
        &speaker.id,
        &speaker.tx,
        ClientEvent::Transcript {
            code: code.to_string(),
            text: text.to_string(),
            is_final,
            timestamp: None,
            offset: None,
            duration: None,
            translations,
        },
    )
    .await;
}

/// Drain events until the channel stays quiet for `quiet`.
async fn collect(rx: &mut mpsc::Receiver<ServerEvent>, quiet: Duration) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet, rx.recv()).await {
        events.push(event);
    }
    events
}

fn audio_texts(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::AudioStream(payload) => Some(
                String::from_utf8(payload.decode_audio().unwrap()).unwrap(),
            ),
            _ => None,
        })
        .collect()
}

fn update_count(events: &[ServerEvent], language: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ServerEvent::TranslationUpdate { language: l, .. } if l == language))
        .count()
}

fn es(text: &str) -> Option<HashMap<String, String>> {
    Some(HashMap::from([("es".to_string(), text.to_string())]))
}

#[tokio::test]
async fn test_progressive_sentence_hybrid() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "DEMO", "en").await;
    // Lowercase code routes to the same session.
    join_listener(&hub, &listener, "demo", "es").await;

    let stream = [
        ("Hola", false),
        ("Hola a todos", false),
        ("Hola a todos.", false),
        ("Hola a todos. Bienvenidos", false),
        ("Hola a todos. Bienvenidos a la reunión.", true),
    ];
    for (text, is_final) in stream {
        send_transcript(&hub, &speaker, "DEMO", text, is_final, es(text)).await;
    }

    let events = collect(&mut listener.rx, Duration::from_millis(400)).await;

    // Joined acknowledgement arrived first.
    assert!(matches!(events[0], ServerEvent::Joined { ok: true, .. }));

    // Display completeness: one update per accepted transcript event.
    assert_eq!(update_count(&events, "es"), 5);

    // Exactly two audio emissions, order preserved.
    let audio = audio_texts(&events);
    assert_eq!(audio, vec!["Hola a todos.", "Bienvenidos a la reunión."]);
}

#[tokio::test]
async fn test_multi_sentence_final_voices_each_once() {
    let (hub, _) = build_hub(
        |s| s.segmentation.policy = SegmentationPolicyKind::FinalOnly,
        Arc::new(EchoTts),
    );
    let speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "TEST", "en").await;
    join_listener(&hub, &listener, "TEST", "es").await;

    let text = "Hello there everyone. How are you today? I'm fine, thank you.";
    send_transcript(&hub, &speaker, "TEST", text, true, es(text)).await;

    let events = collect(&mut listener.rx, Duration::from_millis(400)).await;
    let audio = audio_texts(&events);
    assert_eq!(
        audio,
        vec![
            "Hello there everyone.",
            "How are you today?",
            "I'm fine, thank you."
        ]
    );

    // Re-sending the same final yields no further audio.
    send_transcript(&hub, &speaker, "TEST", text, true, es(text)).await;
    let events = collect(&mut listener.rx, Duration::from_millis(300)).await;
    assert!(audio_texts(&events).is_empty());
    // The listener still saw the text update.
    assert_eq!(update_count(&events, "es"), 1);
}

#[tokio::test]
async fn test_revision_is_never_voiced() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "REVW", "en").await;
    join_listener(&hub, &listener, "REVW", "es").await;

    for (text, is_final) in [
        ("The cat", false),
        ("The cat is", false),
        ("The cats", false),
        ("The cats are playing.", true),
    ] {
        send_transcript(&hub, &speaker, "REVW", text, is_final, es(text)).await;
    }

    let events = collect(&mut listener.rx, Duration::from_millis(400)).await;
    let audio = audio_texts(&events);
    assert_eq!(audio, vec!["The cats are playing."]);
    assert!(audio.iter().all(|a| !a.contains("cat ")));
}

#[tokio::test]
async fn test_unknown_code_rejected_on_listener_join() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let mut listener = conn("listener");

    join_listener(&hub, &listener, "NOPE", "es").await;

    let events = collect(&mut listener.rx, Duration::from_millis(100)).await;
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::SessionNotFound { code }] if code == "NOPE"
    ));
}

#[tokio::test]
async fn test_malformed_speaker_code_is_ignored() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let speaker = conn("speaker");
    let mut speaker_rx = conn("probe");

    hub.handle_event(
        &speaker.id,
        &speaker_rx.tx,
        ClientEvent::SpeakerJoin {
            code: "TOOLONG".to_string(),
            source_lang: "en".to_string(),
            target_langs: None,
            source_hint: None,
        },
    )
    .await;

    assert_eq!(hub.session_count(), 0);
    let events = collect(&mut speaker_rx.rx, Duration::from_millis(100)).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_session_isolation() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let speaker_a = conn("speaker-a");
    let speaker_b = conn("speaker-b");
    let mut listener_a = conn("listener-a");
    let mut listener_b = conn("listener-b");

    join_speaker(&hub, &speaker_a, "AAAA", "en").await;
    join_speaker(&hub, &speaker_b, "BBBB", "en").await;
    join_listener(&hub, &listener_a, "AAAA", "es").await;
    join_listener(&hub, &listener_b, "BBBB", "es").await;

    let text = "Only session A should hear this.";
    send_transcript(&hub, &speaker_a, "AAAA", text, true, es(text)).await;

    let events_a = collect(&mut listener_a.rx, Duration::from_millis(400)).await;
    let events_b = collect(&mut listener_b.rx, Duration::from_millis(200)).await;

    assert_eq!(update_count(&events_a, "es"), 1);
    assert!(!audio_texts(&events_a).is_empty());

    assert_eq!(update_count(&events_b, "es"), 0);
    assert!(audio_texts(&events_b).is_empty());
}

#[tokio::test]
async fn test_listener_language_change_mid_stream() {
    let (hub, _) = build_hub(
        |s| s.segmentation.policy = SegmentationPolicyKind::FinalOnly,
        Arc::new(EchoTts),
    );
    let speaker = conn("speaker");
    let mut listener = conn("listener");
    let mut steady = conn("steady");

    join_speaker(&hub, &speaker, "TEST", "en").await;
    join_listener(&hub, &listener, "TEST", "fr").await;
    join_listener(&hub, &steady, "TEST", "fr").await;

    let first = "The first announcement is ready.";
    send_transcript(
        &hub,
        &speaker,
        "TEST",
        first,
        true,
        Some(HashMap::from([("fr".to_string(), first.to_string())])),
    )
    .await;
    let _ = collect(&mut listener.rx, Duration::from_millis(300)).await;
    let _ = collect(&mut steady.rx, Duration::from_millis(100)).await;

    hub.handle_event(
        &listener.id,
        &listener.tx,
        ClientEvent::ChangeLanguage {
            code: "TEST".to_string(),
            lang: "es".to_string(),
        },
    )
    .await;

    let second = "The second announcement is ready.";
    send_transcript(
        &hub,
        &speaker,
        "TEST",
        second,
        true,
        Some(HashMap::from([
            ("fr".to_string(), format!("fr: {second}")),
            ("es".to_string(), format!("es: {second}")),
        ])),
    )
    .await;

    let moved = collect(&mut listener.rx, Duration::from_millis(400)).await;
    let stayed = collect(&mut steady.rx, Duration::from_millis(300)).await;

    // The changed listener now receives Spanish only.
    assert!(matches!(moved.first(), Some(ServerEvent::LanguageChanged { lang }) if lang == "es"));
    assert_eq!(update_count(&moved, "es"), 1);
    assert_eq!(update_count(&moved, "fr"), 0);
    let moved_audio = audio_texts(&moved);
    assert!(moved_audio.iter().all(|a| a.starts_with("es:")));

    // The steady listener continues in French.
    assert_eq!(update_count(&stayed, "fr"), 1);
    assert!(audio_texts(&stayed).iter().all(|a| a.starts_with("fr:")));
}

#[tokio::test]
async fn test_speaker_disconnect_cleans_up() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "GONE", "en").await;
    join_listener(&hub, &listener, "GONE", "es").await;
    let _ = collect(&mut listener.rx, Duration::from_millis(100)).await;

    hub.handle_disconnect(&speaker.id).await;

    let events = collect(&mut listener.rx, Duration::from_millis(200)).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::SpeakerDisconnected { code } if code == "GONE")));
    assert_eq!(hub.session_count(), 0);
}

#[tokio::test]
async fn test_replacing_speaker_tears_down_prior_session() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let first = conn("first-speaker");
    let second = conn("second-speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &first, "SWAP", "en").await;
    join_listener(&hub, &listener, "SWAP", "es").await;
    let _ = collect(&mut listener.rx, Duration::from_millis(100)).await;

    join_speaker(&hub, &second, "SWAP", "fr").await;

    let events = collect(&mut listener.rx, Duration::from_millis(200)).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::SpeakerDisconnected { .. })));
    assert_eq!(hub.session_count(), 1);

    let session = hub
        .get_session(&relay_core::SessionCode::parse("SWAP").unwrap())
        .unwrap();
    assert_eq!(session.source_lang, "fr");
}

#[tokio::test]
async fn test_overflow_drops_oldest_and_counts() {
    let (hub, metrics) = build_hub(
        |s| {
            s.segmentation.policy = SegmentationPolicyKind::FinalOnly;
            s.tts.critical_queue_size = 3;
        },
        Arc::new(SlowTts(Duration::from_millis(100))),
    );
    let speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "LOAD", "en").await;
    join_listener(&hub, &listener, "LOAD", "es").await;

    let subjects = [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliett", "kilo", "lima",
    ];
    for subject in subjects {
        let text = format!("Topic {subject} moves to a vote.");
        send_transcript(&hub, &speaker, "LOAD", &text, true, es(&text)).await;
    }

    let events = collect(&mut listener.rx, Duration::from_millis(600)).await;
    let audio = audio_texts(&events);

    // Oldest entries dropped under pressure, newest preserved in order.
    assert!(metrics.dropped_total() >= 1, "drops must be counted");
    assert!(audio.len() < subjects.len());
    assert_eq!(audio.last().unwrap(), "Topic lima moves to a vote.");

    // Every transcript still produced a display update.
    assert_eq!(update_count(&events, "es"), subjects.len());
}

#[tokio::test]
async fn test_transcript_to_unknown_session_reports_error() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let mut speaker = conn("speaker");

    send_transcript(&hub, &speaker, "MISS", "Anyone listening?", true, None).await;

    let events = collect(&mut speaker.rx, Duration::from_millis(100)).await;
    assert!(matches!(events.as_slice(), [ServerEvent::Error { .. }]));
}

#[tokio::test]
async fn test_speaker_receives_broadcast_diagnostics() {
    let (hub, _) = build_hub(|_| {}, Arc::new(EchoTts));
    let mut speaker = conn("speaker");
    let mut listener = conn("listener");

    join_speaker(&hub, &speaker, "DIAG", "en").await;
    join_listener(&hub, &listener, "DIAG", "es").await;

    let text = "Numbers are trending upward.";
    send_transcript(&hub, &speaker, "DIAG", text, true, es(text)).await;

    let events = collect(&mut speaker.rx, Duration::from_millis(300)).await;
    let broadcast = events.iter().find_map(|e| match e {
        ServerEvent::TranslationBroadcast {
            original,
            translations,
            is_final,
            ..
        } => Some((original.clone(), translations.clone(), *is_final)),
        _ => None,
    });

    let (original, translations, is_final) = broadcast.expect("speaker gets a broadcast echo");
    assert_eq!(original, text);
    assert_eq!(translations["es"], text);
    assert!(is_final);
    let _ = collect(&mut listener.rx, Duration::from_millis(100)).await;
}
