//! Vocabulary app backend
//!
//! - Axum HTTP API for the mobile app: daily challenge, OCR, AI definitions
//! - Document store: in-memory (seeded) or Cloud Firestore over REST
//! - Caller identity from Firebase ID tokens (or a static token table locally)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   ALLOWED_ORIGINS      : comma-separated CORS allow-list
//!   STORE_BACKEND        : "memory" (default) or "firestore"
//!   FIREBASE_PROJECT_ID  : Firestore project and ID-token audience
//!   AUTH_MODE            : "firebase" (default) or "static"
//!   GEMINI_API_KEY       : enables /generateAiDefinition
//!   VISION_API_KEY       : enables /processImageForOcr
//!   APP_CONFIG_PATH      : path to TOML config (all of the above + prompts)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod seeds;
mod store;
mod auth;
mod challenge;
mod gemini;
mod vision;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_app_config;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // TOML file (optional) overlaid by env variables.
  let cfg = load_app_config();

  // Shared state: document store, identity verifier, Gemini / Vision clients.
  let state = Arc::new(AppState::from_config(&cfg)?);

  let app = build_router(state, &cfg.allowed_origins);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "vocab_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "vocab_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "vocab_backend", "Shutdown signal received");
}
