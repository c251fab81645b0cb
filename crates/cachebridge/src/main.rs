use anyhow::Result;
use cachebridge::{check_cookie, serve, LogFormat, PluginConfig, RedisCachePlugin};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// cachebridge - Redis cache backend plugin
///
/// Launched by a plugin host, which talks to it over stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "cachebridge")]
#[command(version, about, long_about = None)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    let _cli = Cli::parse();
    let config = PluginConfig::from_env();

    if let Err(e) = check_cookie(&config, std::env::var(&config.cookie_key).ok().as_deref()) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cache plugin");

    let mut plugin = RedisCachePlugin::default();
    serve(
        &mut plugin,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await?;

    tracing::info!("Cache plugin stopped");
    Ok(())
}

/// Logs go to stderr; stdout carries the plugin protocol.
fn init_tracing(config: &PluginConfig) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new("cachebridge=info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
