use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use vst_config::VstConfig;
use vst_core::ClientCache;
use vst_db::service::ItemService;

mod cli;
mod commands;
mod output;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("vst error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;
    let flags = cli.global_flags();

    let config = VstConfig::load_with_dotenv().context("failed to load vstore configuration")?;
    tracing::debug!(
        project = %config.project.id,
        remote = config.store.is_remote(),
        "configuration loaded"
    );

    // One cache for the whole process; every command shares it.
    let cache = Arc::new(ClientCache::new());
    let service = Arc::new(ItemService::new(Arc::clone(&cache), config));

    let result = commands::dispatch::dispatch(cli.command, &service, &flags).await;

    if let Err(error) = service.shutdown().await {
        tracing::warn!(%error, "failed to close cached store clients");
    }
    result
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("VSTORE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
