//! Workshop Verification Backend
//!
//! - Axum HTTP API for verification, progress, ratings, and variables
//! - Pluggable verification targets (confirm, quiz, survey, script, codelab)
//! - Optional external progress/catalog services (via environment variables)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   WORKSHOP_CONFIG_PATH : path to the book config JSON (default ./book.json)
//!   APP_DIRECTORY        : root for author files referenced by targets
//!   TEMP_DIRECTORY       : scratch root for codelab workspaces
//!   DOC_ID               : workshop identifier reported to external services
//!   SERVICE_PROGRESS     : progress service base URL (optional)
//!   SERVICE_CATALOG      : catalog service base URL (optional)
//!   VERIFY_DEBUG         : "yes" dumps sandboxed child output to the logs
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod errors;
mod store;
mod client;
mod state;
mod protocol;
mod verifier;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::WorkshopConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // A broken book config or target definition must stop the process here,
  // before the workshop starts serving half-working verification.
  let config = WorkshopConfig::load_from_env()?;
  let state = Arc::new(AppState::new(config)?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "workshop_backend", %addr, doc_id = %state.config.doc_id, title = %state.config.title, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
