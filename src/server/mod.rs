//! HTTP surface: a thin router that validates, enqueues, and answers status
//! queries. Every other concern (pipeline, recognizer, persistence,
//! webhook) lives behind `Orchestrator`.
//!
//! Grounded on the teacher's `AppState`/`create_router`/`serve` shape
//! (`src/server/mod.rs`): one `Clone`-able state struct handed to
//! `axum::Router::with_state`, a `create_router` free function, and a
//! `serve` entry point that binds and runs.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub api_key: Option<Arc<String>>,
}

/// Bind and serve. Runs until the process is killed.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
