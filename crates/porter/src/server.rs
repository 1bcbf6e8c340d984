use anyhow::Result;
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::sync::watch;

use crate::gate::{self, GateState};
use crate::proxy;

pub fn router(state: Arc<GateState>) -> Router {
    Router::new()
        .fallback(proxy::forward)
        .layer(middleware::from_fn_with_state(state.clone(), gate::auth_gate))
        .with_state(state)
}

pub async fn start_server(
    state: Arc<GateState>,
    bind: &str,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    println!("🚪 Porter listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    Ok(())
}

async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    // Wait for shutdown signal
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    println!("Shutting down porter...");
}
