use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use skatespot_throttle::config::ServiceConfig;
use skatespot_throttle::http::HttpServer;
use skatespot_throttle::logging;
use skatespot_throttle::ratelimit::{spawn_sweeper, RateLimiter, RuleRegistry};

/// Sliding-window rate limit decision service for the skate spots backend.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// YAML file with rate limit rules, layered over the built-in rules
    #[arg(long)]
    rules: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(rules) = cli.rules {
        config.rate_limiting.rules_path = Some(rules);
    }
    if cli.log_json {
        config.logging.json = true;
    }

    logging::init(&config.logging);

    info!("Starting Skate Spots throttling service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let rules = match config.rate_limiting.rules_path {
        Some(ref path) => RuleRegistry::from_file(path)?,
        None => RuleRegistry::builtin(),
    };
    for (name, rule) in rules.iter() {
        info!(
            name = name,
            scope = rule.scope(),
            limit = rule.limit(),
            window_secs = rule.window_seconds(),
            "Rate limit rule registered"
        );
    }

    let rate_limiter = Arc::new(RateLimiter::new());
    info!("Rate limiter initialized");

    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|interval| spawn_sweeper(Arc::clone(&rate_limiter), interval));

    let server = HttpServer::new(config.server.http_addr, rate_limiter, Arc::new(rules))
        .with_admin_reset(config.admin.enable_reset);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("Skate Spots throttling service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
