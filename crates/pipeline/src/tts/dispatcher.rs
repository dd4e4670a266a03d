//! Request-mode synthesis dispatcher
//!
//! One dispatcher per (session, language): a FIFO of pending utterances
//! and a single worker, so audio leaves in utterance order. Queue depth
//! drives the adaptive playback rate; sustained overflow drops the oldest
//! entries (never the newest) and rejects their completion handles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Notify};

use relay_config::TtsSettings;
use relay_core::RelayMetrics;

use super::{AudioChunk, AudioPayload, SynthesisRequest, TtsError, TtsProvider};

/// One queued synthesis request.
pub struct TtsEntry {
    pub text: String,
    pub voice: String,
    pub confidence: f64,
    pub is_final: bool,
    pub enqueued_at: Instant,
    done: oneshot::Sender<Result<(), TtsError>>,
}

#[derive(Debug, Default)]
struct ProviderHealth {
    consecutive_errors: u32,
    disabled_until: Option<Instant>,
}

struct ProviderSlot {
    provider: Arc<dyn TtsProvider>,
    health: Mutex<ProviderHealth>,
}

impl ProviderSlot {
    fn new(provider: Arc<dyn TtsProvider>) -> Self {
        Self {
            provider,
            health: Mutex::new(ProviderHealth::default()),
        }
    }

    fn available(&self) -> bool {
        let mut health = self.health.lock();
        match health.disabled_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                health.disabled_until = None;
                health.consecutive_errors = 0;
                true
            }
            None => true,
        }
    }

    fn record_success(&self) {
        let mut health = self.health.lock();
        health.consecutive_errors = 0;
        health.disabled_until = None;
    }

    fn record_failure(&self, max_consecutive: u32, cooloff: Duration, name: &str) {
        let mut health = self.health.lock();
        health.consecutive_errors += 1;
        if health.consecutive_errors > max_consecutive && health.disabled_until.is_none() {
            health.disabled_until = Some(Instant::now() + cooloff);
            tracing::warn!(
                provider = name,
                errors = health.consecutive_errors,
                cooloff_secs = cooloff.as_secs(),
                "synthesis provider benched after consecutive failures"
            );
        }
    }
}

struct DispatcherInner {
    language: String,
    settings: TtsSettings,
    queue: Mutex<VecDeque<TtsEntry>>,
    notify: Notify,
    primary: Option<ProviderSlot>,
    secondary: Option<ProviderSlot>,
    sequence: AtomicU64,
    last_rate: Mutex<f64>,
    out: mpsc::Sender<AudioChunk>,
    metrics: Arc<RelayMetrics>,
}

/// Handle to one per-(session, language) synthesis queue.
#[derive(Clone)]
pub struct TtsDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TtsDispatcher {
    /// Spawn the worker for one (session, language) queue.
    pub fn spawn(
        language: impl Into<String>,
        primary: Option<Arc<dyn TtsProvider>>,
        secondary: Option<Arc<dyn TtsProvider>>,
        settings: TtsSettings,
        out: mpsc::Sender<AudioChunk>,
        metrics: Arc<RelayMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let inner = Arc::new(DispatcherInner {
            language: language.into(),
            settings,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            primary: primary.map(ProviderSlot::new),
            secondary: secondary.map(ProviderSlot::new),
            sequence: AtomicU64::new(0),
            last_rate: Mutex::new(1.0),
            out,
            metrics,
        });

        tokio::spawn(worker_loop(Arc::clone(&inner), shutdown));

        Self { inner }
    }

    /// Queue one utterance. The returned handle resolves when its audio
    /// has been handed to the fan-out, or rejects if the entry is dropped,
    /// cancelled, or fails on every provider.
    pub fn enqueue(
        &self,
        text: impl Into<String>,
        voice: impl Into<String>,
        confidence: f64,
        is_final: bool,
    ) -> oneshot::Receiver<Result<(), TtsError>> {
        let (done, rx) = oneshot::channel();
        let entry = TtsEntry {
            text: text.into(),
            voice: voice.into(),
            confidence,
            is_final,
            enqueued_at: Instant::now(),
            done,
        };

        let overflow = {
            let mut queue = self.inner.queue.lock();
            queue.push_back(entry);
            let len = queue.len();
            self.inner.metrics.queue_entered();
            self.inner.metrics.observe_queue_depth(len);

            let critical = self.inner.settings.critical_queue_size;
            if len > critical * 2 {
                let drop_count = len - critical;
                let dropped: Vec<TtsEntry> = queue.drain(..drop_count).collect();
                Some(dropped)
            } else {
                None
            }
        };

        if let Some(dropped) = overflow {
            let count = dropped.len();
            tracing::warn!(
                language = %self.inner.language,
                dropped = count,
                "synthesis queue saturated, dropping oldest entries"
            );
            self.inner.metrics.entries_dropped(count);
            self.inner.metrics.queue_left(count);
            for entry in dropped {
                let _ = entry.done.send(Err(TtsError::Dropped));
            }
        }

        self.inner.notify.notify_one();
        rx
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn language(&self) -> &str {
        &self.inner.language
    }
}

impl DispatcherInner {
    /// Rate climbs once the backlog passes the threshold, one step per
    /// excess item, capped.
    fn adaptive_rate(&self, backlog: usize) -> f64 {
        let threshold = self.settings.queue_threshold;
        if backlog <= threshold {
            return 1.0;
        }
        let excess = (backlog - threshold) as f64;
        (1.0 + self.settings.rate_step * excess).min(self.settings.max_rate)
    }

    fn note_rate(&self, rate: f64) {
        let mut last = self.last_rate.lock();
        if (rate - *last).abs() > f64::EPSILON {
            self.metrics.rate_adjusted();
            if (rate - *last).abs() >= 0.1 {
                tracing::info!(
                    language = %self.language,
                    from = *last,
                    to = rate,
                    "adaptive playback rate changed"
                );
            }
            *last = rate;
        }
    }

    async fn synthesize_with_fallback(
        &self,
        request: &SynthesisRequest,
    ) -> Result<(AudioPayload, bool), TtsError> {
        if self.primary.is_none() && self.secondary.is_none() {
            return Err(TtsError::NotConfigured);
        }

        let timeout = Duration::from_millis(self.settings.request_timeout_ms);
        let cooloff = Duration::from_secs(self.settings.provider_cooloff_secs);
        let max_consecutive = self.settings.max_consecutive_errors;

        let slots = [(&self.primary, false), (&self.secondary, true)];
        for (slot, is_secondary) in slots {
            let Some(slot) = slot else { continue };
            if !slot.available() {
                continue;
            }

            let name = slot.provider.name().to_string();
            match tokio::time::timeout(timeout, slot.provider.synthesize(request)).await {
                Ok(Ok(payload)) => {
                    slot.record_success();
                    return Ok((payload, is_secondary));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %name, error = %e, "synthesis failed");
                    self.metrics.tts_error(is_secondary);
                    slot.record_failure(max_consecutive, cooloff, &name);
                }
                Err(_) => {
                    tracing::warn!(provider = %name, "synthesis timed out");
                    self.metrics.tts_error(is_secondary);
                    slot.record_failure(max_consecutive, cooloff, &name);
                }
            }
        }

        Err(TtsError::Exhausted)
    }

    fn drain_cancel(&self) {
        let entries: Vec<TtsEntry> = self.queue.lock().drain(..).collect();
        self.metrics.queue_left(entries.len());
        for entry in entries {
            let _ = entry.done.send(Err(TtsError::Cancelled));
        }
    }
}

async fn worker_loop(inner: Arc<DispatcherInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        // Wait for work or teardown.
        let entry = loop {
            if *shutdown.borrow() {
                inner.drain_cancel();
                return;
            }
            if let Some(entry) = inner.queue.lock().pop_front() {
                inner.metrics.queue_left(1);
                break entry;
            }
            tokio::select! {
                _ = inner.notify.notified() => {}
                _ = shutdown.changed() => {}
            }
        };

        let backlog = inner.queue.lock().len();
        let rate = inner.adaptive_rate(backlog);
        inner.note_rate(rate);

        let request = SynthesisRequest {
            text: entry.text.clone(),
            language: inner.language.clone(),
            voice: entry.voice.clone(),
            rate,
        };

        let result = tokio::select! {
            result = inner.synthesize_with_fallback(&request) => result,
            _ = shutdown.changed() => {
                let _ = entry.done.send(Err(TtsError::Cancelled));
                inner.drain_cancel();
                return;
            }
        };

        match result {
            Ok((payload, used_secondary)) => {
                inner.metrics.utterance_voiced(used_secondary);
                let chunk = AudioChunk {
                    language: inner.language.clone(),
                    bytes: payload.bytes,
                    format: payload.format,
                    text: Some(entry.text),
                    sequence: inner.sequence.fetch_add(1, Ordering::Relaxed),
                    confidence: Some(entry.confidence),
                    is_final: Some(entry.is_final),
                    streaming: false,
                };
                if inner.out.send(chunk).await.is_err() {
                    let _ = entry.done.send(Err(TtsError::Cancelled));
                    inner.drain_cancel();
                    return;
                }
                let _ = entry.done.send(Ok(()));
            }
            Err(e) => {
                // One utterance lost; the queue and the session carry on.
                tracing::warn!(
                    language = %inner.language,
                    error = %e,
                    "utterance dropped, no provider produced audio"
                );
                inner.metrics.tts_exhausted();
                let _ = entry.done.send(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingProvider {
        name: &'static str,
        delay: Duration,
        fail: bool,
        rates: Mutex<Vec<f64>>,
    }

    impl RecordingProvider {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                fail: false,
                rates: Mutex::new(Vec::new()),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                fail: false,
                rates: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                fail: true,
                rates: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TtsProvider for RecordingProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, TtsError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(TtsError::Request("induced".to_string()));
            }
            self.rates.lock().push(request.rate);
            Ok(AudioPayload {
                bytes: request.text.as_bytes().to_vec(),
                format: "mp3".to_string(),
            })
        }
    }

    fn dispatcher(
        primary: Option<Arc<dyn TtsProvider>>,
        secondary: Option<Arc<dyn TtsProvider>>,
        settings: TtsSettings,
    ) -> (TtsDispatcher, mpsc::Receiver<AudioChunk>, watch::Sender<bool>) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let d = TtsDispatcher::spawn(
            "es",
            primary,
            secondary,
            settings,
            out_tx,
            Arc::new(RelayMetrics::new()),
            shutdown_rx,
        );
        (d, out_rx, shutdown_tx)
    }

    #[tokio::test]
    async fn test_audio_order_matches_enqueue_order() {
        let provider = RecordingProvider::new("primary");
        let (d, mut rx, _sd) = dispatcher(Some(provider), None, TtsSettings::default());

        d.enqueue("one", "v", 1.0, false);
        d.enqueue("two", "v", 1.0, false);
        d.enqueue("three", "v", 1.0, true);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.text.as_deref(), Some("one"));
        assert_eq!(second.text.as_deref(), Some("two"));
        assert_eq!(third.text.as_deref(), Some("three"));
        assert_eq!((first.sequence, second.sequence, third.sequence), (0, 1, 2));
        assert_eq!(third.is_final, Some(true));
    }

    #[tokio::test]
    async fn test_secondary_fallback() {
        let primary = RecordingProvider::failing("primary");
        let secondary = RecordingProvider::new("secondary");
        let (d, mut rx, _sd) = dispatcher(
            Some(primary),
            Some(secondary.clone()),
            TtsSettings::default(),
        );

        let done = d.enqueue("fallback me", "v", 1.0, true);
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.text.as_deref(), Some("fallback me"));
        assert!(done.await.unwrap().is_ok());
        assert_eq!(secondary.rates.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_both_providers_failing_rejects_entry() {
        let primary = RecordingProvider::failing("primary");
        let secondary = RecordingProvider::failing("secondary");
        let (d, _rx, _sd) = dispatcher(Some(primary), Some(secondary), TtsSettings::default());

        let done = d.enqueue("doomed", "v", 1.0, false);
        let result = done.await.unwrap();
        assert!(matches!(result, Err(TtsError::Exhausted)));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_preserves_newest() {
        let settings = TtsSettings {
            critical_queue_size: 4,
            ..TtsSettings::default()
        };
        let provider = RecordingProvider::slow("primary", Duration::from_millis(200));
        let (d, mut rx, _sd) = dispatcher(Some(provider), None, settings);

        let mut handles = Vec::new();
        for i in 0..12 {
            handles.push(d.enqueue(format!("u{i}"), "v", 1.0, false));
        }

        // Pushing the 9th entry tips the queue past 2x critical; the
        // oldest five drop, the newest survive.
        let mut dropped = Vec::new();
        for (i, handle) in handles.into_iter().enumerate() {
            if matches!(handle.await, Ok(Err(TtsError::Dropped))) {
                dropped.push(i);
            }
        }
        assert_eq!(dropped, vec![0, 1, 2, 3, 4]);
        assert!(d.queue_len() <= 8, "queue must stay bounded");

        // Survivors synthesize in their original order.
        let first_audio = rx.recv().await.unwrap();
        assert_eq!(first_audio.text.as_deref(), Some("u5"));
        let mut last = first_audio.text.unwrap();
        while let Ok(chunk) =
            tokio::time::timeout(Duration::from_millis(400), rx.recv()).await
        {
            match chunk {
                Some(chunk) => last = chunk.text.unwrap(),
                None => break,
            }
        }
        assert_eq!(last, "u11");
    }

    #[tokio::test]
    async fn test_adaptive_rate_bounds() {
        let settings = TtsSettings {
            queue_threshold: 1,
            rate_step: 0.05,
            max_rate: 1.2,
            ..TtsSettings::default()
        };
        let provider = RecordingProvider::slow("primary", Duration::from_millis(30));
        let (d, mut rx, _sd) = dispatcher(Some(provider.clone()), None, settings);

        for i in 0..8 {
            d.enqueue(format!("u{i}"), "v", 1.0, false);
        }
        for _ in 0..8 {
            rx.recv().await.unwrap();
        }

        let rates = provider.rates.lock().clone();
        assert!(rates.iter().all(|&r| (1.0..=1.2).contains(&r)));
        assert!(rates.iter().any(|&r| r > 1.0), "backlog should raise the rate");
        // The final entry runs against an empty queue at natural rate.
        assert_eq!(*rates.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_pending() {
        let provider = RecordingProvider::slow("primary", Duration::from_millis(200));
        let (d, _rx, sd) = dispatcher(Some(provider), None, TtsSettings::default());

        let first = d.enqueue("in flight", "v", 1.0, false);
        let second = d.enqueue("queued", "v", 1.0, false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        sd.send(true).unwrap();

        assert!(matches!(first.await, Ok(Err(TtsError::Cancelled))));
        assert!(matches!(second.await, Ok(Err(TtsError::Cancelled))));
    }

    #[tokio::test]
    async fn test_provider_benched_after_consecutive_errors() {
        let settings = TtsSettings {
            max_consecutive_errors: 2,
            ..TtsSettings::default()
        };
        let primary = RecordingProvider::failing("primary");
        let secondary = RecordingProvider::new("secondary");
        let (d, mut rx, _sd) = dispatcher(Some(primary), Some(secondary.clone()), settings);

        for i in 0..5 {
            d.enqueue(format!("u{i}"), "v", 1.0, false);
        }
        for _ in 0..5 {
            rx.recv().await.unwrap();
        }
        // Every utterance still produced audio via the secondary.
        assert_eq!(secondary.rates.lock().len(), 5);
    }
}
