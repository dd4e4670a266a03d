//! HTTP control plane

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::prometheus_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let cors_enabled = state.settings.server.cors_enabled;

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/api/metrics", get(metrics_snapshot))
        .route("/metrics", get(prometheus_handler))
        .route("/api/speech/token", get(speech_token))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    let router = if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "method": "GET",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.hub.session_count(),
    }))
}

/// JSON counter snapshot for dashboards and test harnesses.
async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Issue a short-lived browser STT credential by calling the configured
/// issuer. The token is opaque here: the issuer's response is forwarded
/// as-is.
async fn speech_token(State(state): State<AppState>) -> impl IntoResponse {
    let token_settings = &state.settings.speech_token;
    let Some(endpoint) = &token_settings.issuer_endpoint else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "speech token issuer not configured" })),
        );
    };

    let mut request = state.http_client.post(endpoint);
    if let Some(key) = &token_settings.api_key {
        request = request.header("Ocp-Apim-Subscription-Key", key);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            let token = response.text().await.unwrap_or_default();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "token": token,
                    "region": token_settings.region,
                })),
            )
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), "speech token issuer rejected request");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "token issuer rejected request" })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "speech token issuer unreachable");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "token issuer unreachable" })),
            )
        }
    }
}
