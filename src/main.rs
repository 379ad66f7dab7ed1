//! VeriCode · Verilog practice backend
//!
//! - Axum HTTP API for the problem library and the oracles
//! - One WebSocket practice session per connection, with debounced progress sync
//! - Optional OpenAI integration for generation, grading and tutoring
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : enables the oracles if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL    : tutor model, default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL  : generation/grading model, default "gpt-4o"
//!   VERICODE_CONFIG_PATH : path to TOML config (prompts, extra problems, sync, store, identity)
//!   VERICODE_DATA_DIR    : progress directory for the filesystem store
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod catalog;
mod config;
mod domain;
mod identity;
mod logic;
mod openai;
mod protocol;
mod routes;
mod session;
mod state;
mod store;
mod sync;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: problem library, progress store, OpenAI client, prompts.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "vericode_backend", %addr, problems = state.catalog.all().len(), "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
      info!(target: "vericode_backend", "Shutting down");
    })
    .await?;
  Ok(())
}
