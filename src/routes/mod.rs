//! Router assembly: the three app endpoints, health, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{any, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - `/generateDailyChallenge` (GET or POST)
/// - `/processImageForOcr` (callable protocol, POST)
/// - `/generateAiDefinition` (any method; the handler answers 405 after auth)
/// - `/api/v1/health`
/// - CORS restricted to `allowed_origins`
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/generateDailyChallenge",
            get(http::http_generate_daily_challenge).post(http::http_generate_daily_challenge),
        )
        .route("/processImageForOcr", post(http::http_process_image_for_ocr))
        .route("/generateAiDefinition", any(http::http_generate_ai_definition))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Explicit origin list; entries that are not valid header values are dropped.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "vocab_backend", origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
