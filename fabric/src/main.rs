use anyhow::{Context, Result};
use clap::Parser;
use kubently_common::shutdown::shutdown_signal;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::app::FabricState;
use crate::bus::CommandBus;
use crate::capability::CapabilityRegistry;
use crate::credstore::CredentialStore;

mod app;
mod bus;
mod capability;
mod command;
mod credstore;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    kubently_common::init();
    tracing_subscriber::fmt::init();

    let args = kubently_common::args::FabricArgs::parse();
    let api_keys = args
        .api_keys
        .parse_map()
        .context("failed to parse API_KEYS")?;

    kubently_common::metrics::maybe_spawn_metrics_server();

    let redis_pool = kubently_common::redis::init_redis(&args.redis).await;
    let cancel = CancellationToken::new();

    let credstore = CredentialStore::new(redis_pool.clone(), api_keys);
    let bus = CommandBus::new(redis_pool.clone(), args.redis.url(), cancel.clone());
    let capabilities = CapabilityRegistry::new(redis_pool);
    let state = FabricState::new(credstore, bus, capabilities, args.clone());

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    println!(
        "{}{}",
        "🚀 Starting kubently-fabric • port=".green(),
        format!("{}", args.port).green().dimmed(),
    );
    server::run(cancel, args.port, state).await?;
    println!("{}", "🛑 kubently-fabric shut down gracefully.".red());
    Ok(())
}
