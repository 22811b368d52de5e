//! Sentry exporter entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sentry_exporter::config::SharedConfig;
use sentry_exporter::web::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about = "Prometheus exporter probing the Sentry API")]
struct Cli {
    /// Exporter configuration file.
    #[arg(long, default_value = "sentry_exporter.yml")]
    config: String,

    /// The address to listen on for HTTP requests.
    #[arg(long, default_value = "0.0.0.0:9412")]
    listen_address: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sentry_exporter=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting sentry_exporter {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(SharedConfig::load(&cli.config)?);

    // Reload the config file on SIGHUP.
    #[cfg(unix)]
    {
        let config = config.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let mut hup = match signal(SignalKind::hangup()) {
                Ok(hup) => hup,
                Err(e) => {
                    tracing::error!("Failed to install SIGHUP handler: {}", e);
                    return;
                }
            };
            while hup.recv().await.is_some() {
                if let Err(e) = config.reload().await {
                    tracing::error!("Error reloading config: {}", e);
                }
            }
        });
    }

    let server = Server::new(config, cli.listen_address);
    server.start().await
}
