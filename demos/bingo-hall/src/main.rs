//! Bingo hall demo server.
//!
//! Runs a WebSocket bingo server backed by an in-memory wallet that
//! credits every new user with an opening balance.
//!
//! ```text
//! cargo run -p bingo-hall -- --bind 0.0.0.0:8080 --config hall.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use bingo::prelude::*;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::HallConfig;

#[derive(Debug, Parser)]
#[command(name = "bingo-hall", about = "Live multi-player bingo over WebSockets")]
struct Args {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address; overrides the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Starting balance for new users; overrides the config file.
    #[arg(long)]
    opening_balance: Option<Amount>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bingo=info,bingo_room=info,bingo_hall=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => HallConfig::load(path)?,
        None => HallConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(balance) = args.opening_balance {
        config.opening_balance = balance;
    }

    let server = BingoServer::builder()
        .bind(&config.bind)
        .room_config(config.rooms.to_room_config())
        .build(
            Arc::new(MemoryWallet::with_open_accounts(config.opening_balance)),
            Arc::new(MemoryStore::new()),
        )
        .await?;

    let manager = Arc::clone(server.manager());
    for settings in &config.hall {
        let handle = manager.create_room(settings.clone());
        tracing::info!(
            room_id = %handle.room_id(),
            name = %settings.name,
            stake = settings.stake,
            "room open"
        );
    }
    let reaper = manager.spawn_reaper(config.reaper_period());

    tracing::info!(addr = %server.local_addr()?, "bingo hall listening");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    reaper.abort();
    manager.shutdown().await;
    Ok(())
}
