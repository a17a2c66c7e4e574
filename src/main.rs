// CacheLink Agent - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Serves one local cache directory to the CacheLink hub.
// Usage:
//   cachelink-agent <cache_dir>                         # Connect to default hub
//   CACHELINK_HUB_URL=ws://host:port cachelink-agent <cache_dir>
//   cachelink-agent <cache_dir> --hub-url <url> --reconnect-secs 10

use anyhow::{Context, Result};
use cachelink_agent::{
    config::AgentConfig, dispatch::Dispatcher, fs::CacheFs, paths::CacheRoot, tunnel::Tunnel,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "cachelink-agent")]
#[command(author = "Joseph Stone")]
#[command(version = "1.0.0")]
#[command(about = "CacheLink agent - serve a local game cache to the remote editor")]
struct Cli {
    /// Cache directory to expose
    cache_dir: PathBuf,

    /// Hub WebSocket URL (overrides CACHELINK_HUB_URL)
    #[arg(long)]
    hub_url: Option<String>,

    /// Seconds to wait before reconnecting
    #[arg(long)]
    reconnect_secs: Option<u64>,

    /// Optional JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (safe if already init)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    // wss:// needs a process-wide rustls crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    if !cli.cache_dir.is_dir() {
        eprintln!("Error: cache directory not found: {}", cli.cache_dir.display());
        eprintln!("Usage: cachelink-agent <cache_dir>");
        std::process::exit(1);
    }

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => AgentConfig::default(),
    }
    .with_env();
    if let Some(url) = cli.hub_url {
        config.hub_url = url;
    }
    if let Some(secs) = cli.reconnect_secs {
        config.reconnect_delay_secs = secs;
    }

    let root = CacheRoot::open(&cli.cache_dir)
        .with_context(|| format!("Failed to open cache directory {:?}", cli.cache_dir))?;
    let fs = CacheFs::new(root);

    // Soft check only, any directory can be served
    let names = fs.preview(usize::MAX)
        .with_context(|| format!("Failed to list cache directory {:?}", cli.cache_dir))?;
    if !config.looks_like_cache(&names) {
        log::warn!("{} does not look like a game cache (no cache files found)", fs.root().path().display());
    }

    println!("CacheLink Agent v{}", env!("CARGO_PKG_VERSION"));
    println!("Cache: {}", fs.root().path().display());
    println!("Hub:   {}", config.hub_url);

    let tunnel = Tunnel::new(config, Dispatcher::new(fs));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(tunnel.run(shutdown_rx));

    tokio::select! {
        _ = &mut task => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            let _ = shutdown_tx.send(true);
            let _ = task.await;
        }
    }

    Ok(())
}
