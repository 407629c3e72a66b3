// Agentkit Server
// axum routes over the agent: chat streaming, run control, feedback and SQL

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use agentkit_core::Agent;

mod chat;
pub mod error;
mod statistics;

pub use error::{ApiError, ApiErrorBody, ApiErrorResponse};
pub use statistics::SqlStatement;

pub(crate) struct ServerState {
  pub(crate) agent: Agent,
}

/// Every route of the API, mounted under `/api/v1`.
pub fn router(agent: Agent) -> Router {
  let state = Arc::new(ServerState { agent });
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  let api = Router::new()
    .route("/chat/agent", post(chat::agent_chat))
    .route("/chat/run/:run_id/status", get(chat::run_status))
    .route("/chat/run/:run_id/cancel", get(chat::run_cancel))
    .route("/statistics/feedback", post(statistics::send_feedback))
    .route(
      "/sql/execute",
      post(statistics::execute_sql).get(statistics::execute_sql_query),
    );

  Router::new()
    .route("/health", get(health))
    .nest("/api/v1", api)
    .with_state(state)
    .layer(cors)
}

async fn health() -> &'static str {
  "ok"
}

/// A running HTTP server; shuts down when dropped.
pub struct Server {
  addr: SocketAddr,
  shutdown: Option<oneshot::Sender<()>>,
}

impl Server {
  /// Binds `addr` (port 0 picks a free port) and serves in the background.
  pub async fn start(agent: Agent, addr: SocketAddr) -> anyhow::Result<Self> {
    let listener = TcpListener::bind(addr)
      .await
      .with_context(|| format!("failed to bind {addr}"))?;
    let addr = listener.local_addr().context("failed to read bound address")?;
    let app = router(agent);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
      let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
          let _ = shutdown_rx.await;
        })
        .await;
      if let Err(err) = served {
        warn!("server stopped with error: {err}");
      }
    });

    info!(%addr, "agent server listening");
    Ok(Self {
      addr,
      shutdown: Some(shutdown_tx),
    })
  }

  pub fn addr(&self) -> SocketAddr {
    self.addr
  }

  pub fn shutdown(&mut self) {
    if let Some(sender) = self.shutdown.take() {
      let _ = sender.send(());
    }
  }
}

impl Drop for Server {
  fn drop(&mut self) {
    self.shutdown();
  }
}
