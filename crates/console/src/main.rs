mod client;
mod config;
mod session;
mod store;
mod tasks;
mod ui;

use anyhow::Result;
use client::ApiClient;
use config::Config;
use store::{Credentials, LocalStore};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // Load config
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return Err(e);
        }
    };

    // Parse args
    let args: Vec<String> = std::env::args().collect();

    let mut store = LocalStore::open()?;
    let client = ApiClient::new(config.server_url.clone());

    // Handle commands, defaulting to the dashboard if no args
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("dashboard");

    match command {
        "dashboard" => {
            let creds = require_login(&store)?;
            ui::dashboard(client, creds, &mut store).await?;
        }
        "login" => {
            if args.len() < 4 {
                print_usage();
            } else {
                store.login(&args[2], &args[3])?;
                println!("Logged in as {}", args[2]);
            }
        }
        "logout" => {
            store.logout()?;
            println!("Logged out.");
        }
        "config" => {
            if args.len() < 3 {
                println!("Current config:");
                println!("  Server URL: {}", config.server_url);
            } else if args[2] == "set" && args.len() >= 5 && args[3] == "server" {
                config.server_url = args[4].clone();
                config.save()?;
                println!("Server URL updated to: {}", config.server_url);
            } else {
                print_usage();
            }
        }
        message => {
            // Treat any other argument as a message
            let creds = require_login(&store)?;
            ui::single_message(client, creds, &mut store, message.to_string()).await?;
        }
    }

    Ok(())
}

fn require_login(store: &LocalStore) -> Result<Credentials> {
    store
        .credentials()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Not logged in - run: steward login USER_ID TOKEN"))
}

fn print_usage() {
    println!("Steward - task dashboard with an assistant");
    println!("\nUsage:");
    println!("  steward                       Open the dashboard");
    println!("  steward \"your message\"        Send a single message to the assistant");
    println!("  steward login USER_ID TOKEN   Save credentials");
    println!("  steward logout                Forget credentials and conversations");
    println!("  steward config                Show current configuration");
    println!("  steward config set server URL Set backend URL");
}
