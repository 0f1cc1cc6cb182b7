//! CyberLMS · Adaptive Cybersecurity Training Backend
//!
//! - Axum HTTP + WebSocket API (JWT auth, learner and admin roles)
//! - Adaptive training sessions with optional OpenAI feedback, mentor chat and question generation
//! - In-memory store by default, SQLite when `DATABASE_URL` is set
//! - Static SPA fallback (`STATIC_DIR`/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   JWT_SECRET           : token signing secret (random per process when unset)
//!   TOKEN_TTL_SECS       : token lifetime (default 86400)
//!   DATABASE_URL         : e.g. "sqlite://lms.db"; in-memory store when unset
//!   QUESTION_BANK_PATH   : JSON question bank seeded at startup
//!   ADMIN_EMAIL / ADMIN_PASSWORD : bootstrap admin account
//!   STATIC_DIR           : SPA directory (default "./static")
//!   OPENAI_API_KEY       : enables the LLM integration if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL    : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL  : default "gpt-4o"
//!   LMS_CONFIG_PATH      : path to TOML config (prompts, question bank, auth)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod adaptive;
mod admin;
mod analytics;
mod auth;
mod config;
mod domain;
mod error;
mod generator;
mod llm;
mod logic;
mod protocol;
mod quiz;
mod routes;
mod seeds;
mod state;
mod store;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "cyberlms_backend", error = %e, "Could not listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "cyberlms_backend", "Shutdown signal received");
}

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::from_env();
  let port = config.port;

  // Store, seeds, signing keys, LLM client, prompts.
  let state = Arc::new(AppState::new(config).await?);

  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "cyberlms_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}
