//! Application state
//!
//! Shared state across all handlers.

use std::sync::Arc;

use relay_config::Settings;
use relay_core::RelayMetrics;
use relay_pipeline::{HttpTtsProvider, TtsProvider};
use relay_text::TranslationService;

use crate::hub::SessionHub;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub metrics: Arc<RelayMetrics>,
    pub hub: Arc<SessionHub>,
    /// Client for the speech-token issuer.
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let metrics = Arc::new(RelayMetrics::new());
        let translator = Arc::new(TranslationService::new(&settings.translator));

        let primary = build_provider("primary", &settings, &settings.tts.primary);
        let secondary = build_provider("secondary", &settings, &settings.tts.secondary);

        let hub = Arc::new(SessionHub::new(
            Arc::clone(&settings),
            Arc::clone(&metrics),
            translator,
            primary,
            secondary,
        ));

        Self {
            settings,
            metrics,
            hub,
            http_client: reqwest::Client::new(),
        }
    }
}

fn build_provider(
    name: &'static str,
    settings: &Settings,
    provider: &relay_config::TtsProviderSettings,
) -> Option<Arc<dyn TtsProvider>> {
    let endpoint = provider.endpoint.clone()?;
    tracing::info!(provider = name, endpoint = %endpoint, "synthesis provider configured");
    Some(Arc::new(HttpTtsProvider::new(
        name,
        endpoint,
        provider.api_key.clone(),
        settings.tts.audio_format.clone(),
        settings.tts.request_timeout_ms,
    )))
}
