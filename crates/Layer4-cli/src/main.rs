//! Parley CLI - Main entry point

mod cli;
mod transport;

use clap::Parser;
use parley_core::PluginManager;
use parley_foundation::ParleyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parley - chat bot plugin runtime driven from the terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a parley.json config file (default: global + project config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plugin directory (overrides config)
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Per-invocation plugin timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Disable the plugin system
    #[arg(long)]
    no_plugins: bool,

    /// Chat id used for every line read from stdin
    #[arg(long, default_value = "local")]
    chat_id: String,

    /// User id used for every line read from stdin
    #[arg(long, default_value = "local-user")]
    user_id: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ParleyConfig::load_from(path)?,
        None => ParleyConfig::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}", e);
            ParleyConfig::default()
        }),
    };

    if let Some(dir) = &args.plugin_dir {
        config.plugins.directory = dir.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.plugins.timeout_ms = timeout_ms;
    }
    if args.no_plugins {
        config.plugins.enabled = false;
    }

    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let manager = Arc::new(PluginManager::new(config.plugins, working_dir));
    manager.initialize().await;

    let session = cli::Session::new(Arc::clone(&manager), args.user_id, args.chat_id);
    let outcome = session.run().await;

    manager.shutdown().await;
    outcome
}
