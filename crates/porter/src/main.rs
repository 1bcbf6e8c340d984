mod gate;
mod proxy;
mod server;

use anyhow::Result;
use gate::GateState;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let bind = env_or("PORTER_BIND", "0.0.0.0:3100");
    let state = Arc::new(GateState {
        client: reqwest::Client::new(),
        auth_url: env_or("PORTER_AUTH_URL", "http://localhost:3000"),
        upstream_url: env_or("PORTER_UPSTREAM_URL", "http://localhost:3000"),
    });

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::start_server(state, &bind, shutdown_rx).await {
            eprintln!("Porter crashed: {}", e);
        }
    });

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    println!("\nReceived shutdown signal...");

    let _ = shutdown_tx.send(true);
    let _ = server_handle.await;

    println!("Porter shutdown complete.");
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
