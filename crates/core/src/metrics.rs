//! Relay metrics registry
//!
//! A process-wide atomic snapshot of the counters the relay exposes from
//! its control plane. Counters are windowed: the hourly rollup folds the
//! window's latency average into a running average and zeroes the window,
//! while peaks and running averages survive.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide relay counters.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connections
    active_connections: AtomicI64,
    peak_connections: AtomicI64,
    sessions_created: AtomicU64,

    // Translation
    translations: AtomicU64,
    translation_latency_ms_total: AtomicU64,
    high_latency_events: AtomicU64,

    // Synthesis
    utterances_voiced: AtomicU64,
    tts_primary_success: AtomicU64,
    tts_secondary_success: AtomicU64,
    rate_adjustments: AtomicU64,
    queue_depth_current: AtomicI64,
    queue_depth_max: AtomicU64,
    entries_dropped: AtomicU64,

    // Errors by kind
    translator_errors: AtomicU64,
    tts_primary_errors: AtomicU64,
    tts_secondary_errors: AtomicU64,
    tts_exhausted_drops: AtomicU64,
    transport_errors: AtomicU64,

    // Rollup state (bit-cast f64)
    running_avg_latency_ms: AtomicU64,
    rollups_completed: AtomicU64,
}

/// Serializable point-in-time view of [`RelayMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: i64,
    pub peak_connections: i64,
    pub sessions_created: u64,
    pub translations: u64,
    pub avg_translation_latency_ms: f64,
    pub running_avg_latency_ms: f64,
    pub high_latency_events: u64,
    pub utterances_voiced: u64,
    pub tts_primary_success: u64,
    pub tts_secondary_success: u64,
    pub rate_adjustments: u64,
    pub queue_depth_current: i64,
    pub queue_depth_max: u64,
    pub entries_dropped: u64,
    pub translator_errors: u64,
    pub tts_primary_errors: u64,
    pub tts_secondary_errors: u64,
    pub tts_exhausted_drops: u64,
    pub transport_errors: u64,
    pub rollups_completed: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        let now = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connections.fetch_max(now, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn translation_done(&self, latency_ms: u64) {
        self.translations.fetch_add(1, Ordering::Relaxed);
        self.translation_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn high_latency_event(&self) {
        self.high_latency_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn utterance_voiced(&self, secondary: bool) {
        self.utterances_voiced.fetch_add(1, Ordering::Relaxed);
        if secondary {
            self.tts_secondary_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tts_primary_success.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn rate_adjusted(&self) {
        self.rate_adjustments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_queue_depth(&self, depth: usize) {
        self.queue_depth_max.fetch_max(depth as u64, Ordering::Relaxed);
    }

    pub fn queue_entered(&self) {
        self.queue_depth_current.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_left(&self, count: usize) {
        self.queue_depth_current
            .fetch_sub(count as i64, Ordering::Relaxed);
    }

    pub fn entries_dropped(&self, count: usize) {
        self.entries_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn translator_error(&self) {
        self.translator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tts_error(&self, secondary: bool) {
        if secondary {
            self.tts_secondary_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tts_primary_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn tts_exhausted(&self) {
        self.tts_exhausted_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_total(&self) -> u64 {
        self.entries_dropped.load(Ordering::Relaxed)
    }

    /// Current window's average translation latency.
    fn window_avg_latency(&self) -> f64 {
        let count = self.translations.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.translation_latency_ms_total.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            translations: self.translations.load(Ordering::Relaxed),
            avg_translation_latency_ms: self.window_avg_latency(),
            running_avg_latency_ms: f64::from_bits(
                self.running_avg_latency_ms.load(Ordering::Relaxed),
            ),
            high_latency_events: self.high_latency_events.load(Ordering::Relaxed),
            utterances_voiced: self.utterances_voiced.load(Ordering::Relaxed),
            tts_primary_success: self.tts_primary_success.load(Ordering::Relaxed),
            tts_secondary_success: self.tts_secondary_success.load(Ordering::Relaxed),
            rate_adjustments: self.rate_adjustments.load(Ordering::Relaxed),
            queue_depth_current: self.queue_depth_current.load(Ordering::Relaxed),
            queue_depth_max: self.queue_depth_max.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            translator_errors: self.translator_errors.load(Ordering::Relaxed),
            tts_primary_errors: self.tts_primary_errors.load(Ordering::Relaxed),
            tts_secondary_errors: self.tts_secondary_errors.load(Ordering::Relaxed),
            tts_exhausted_drops: self.tts_exhausted_drops.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            rollups_completed: self.rollups_completed.load(Ordering::Relaxed),
        }
    }

    /// Fold the current window into the running averages and zero the
    /// window counters. Peaks and running averages are preserved.
    pub fn rollup(&self) {
        let window_avg = self.window_avg_latency();
        let completed = self.rollups_completed.load(Ordering::Relaxed);

        if self.translations.load(Ordering::Relaxed) > 0 {
            let prior = f64::from_bits(self.running_avg_latency_ms.load(Ordering::Relaxed));
            let blended = if completed == 0 || prior == 0.0 {
                window_avg
            } else {
                (prior * completed as f64 + window_avg) / (completed as f64 + 1.0)
            };
            self.running_avg_latency_ms
                .store(blended.to_bits(), Ordering::Relaxed);
        }

        self.translations.store(0, Ordering::Relaxed);
        self.translation_latency_ms_total.store(0, Ordering::Relaxed);
        self.high_latency_events.store(0, Ordering::Relaxed);
        self.utterances_voiced.store(0, Ordering::Relaxed);
        self.tts_primary_success.store(0, Ordering::Relaxed);
        self.tts_secondary_success.store(0, Ordering::Relaxed);
        self.rate_adjustments.store(0, Ordering::Relaxed);
        self.queue_depth_max.store(0, Ordering::Relaxed);
        self.entries_dropped.store(0, Ordering::Relaxed);
        self.translator_errors.store(0, Ordering::Relaxed);
        self.tts_primary_errors.store(0, Ordering::Relaxed);
        self.tts_secondary_errors.store(0, Ordering::Relaxed);
        self.tts_exhausted_drops.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);

        self.rollups_completed.fetch_add(1, Ordering::Relaxed);
    }
}
