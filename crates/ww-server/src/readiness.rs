//! HTTP readiness endpoint.

use std::future::Future;
use std::net::SocketAddr;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// `GET /ready`: 200 once `ready` holds `true`, 503 before.
pub fn readiness_router(ready: watch::Receiver<bool>) -> Router {
    Router::new().route("/ready", get(ready_handler)).with_state(ready)
}

async fn ready_handler(State(ready): State<watch::Receiver<bool>>) -> (StatusCode, &'static str) {
    if *ready.borrow() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn serve_readiness(
    addr: SocketAddr,
    ready: watch::Receiver<bool>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "readiness endpoint listening");
    axum::serve(listener, readiness_router(ready))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
