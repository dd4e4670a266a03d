//! Observability
//!
//! Prometheus recorder for scrapers plus the JSON snapshot registry
//! served from the control plane. The hourly rollup folds the snapshot
//! window into running averages.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tokio::sync::watch;

use relay_core::RelayMetrics;

use crate::state::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            register_default_metrics();
            METRICS_HANDLE.get()
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install Prometheus recorder");
            None
        }
    }
}

fn register_default_metrics() {
    gauge!("relay_sessions_active").set(0.0);
    counter!("relay_sessions_created_total").absolute(0);
    counter!("relay_translations_total").absolute(0);
    histogram!("relay_translation_duration_seconds").record(0.0);
    counter!("relay_utterances_voiced_total").absolute(0);
    counter!("relay_tts_entries_dropped_total").absolute(0);
    counter!("relay_errors_total", "kind" => "translator").absolute(0);
    counter!("relay_errors_total", "kind" => "tts").absolute(0);
    counter!("relay_errors_total", "kind" => "transport").absolute(0);
}

pub fn record_translation_latency(duration_secs: f64) {
    counter!("relay_translations_total").increment(1);
    histogram!("relay_translation_duration_seconds").record(duration_secs);
}

pub fn record_session_created() {
    counter!("relay_sessions_created_total").increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("relay_sessions_active").set(count as f64);
}

pub fn record_error(kind: &'static str) {
    counter!("relay_errors_total", "kind" => kind).increment(1);
}

/// Prometheus scrape endpoint.
pub async fn prometheus_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.hub.session_count());

    match METRICS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Spawn the hourly rollup task for the JSON snapshot registry.
pub fn start_rollup_task(metrics: Arc<RelayMetrics>, interval: Duration) -> watch::Sender<bool> {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        timer.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    metrics.rollup();
                    tracing::info!("metrics window rolled up");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_translation_latency(0.05);
        record_session_created();
        record_active_sessions(3);
        record_error("translator");
    }

    #[tokio::test]
    async fn test_rollup_task_runs() {
        let metrics = Arc::new(RelayMetrics::new());
        metrics.translation_done(80);
        let stop = start_rollup_task(Arc::clone(&metrics), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop.send(true).unwrap();
        assert!(metrics.snapshot().rollups_completed >= 1);
    }
}
