use std::path::PathBuf;

use clap::Parser;

use alpn_gateway::config::{load_config, ConfigError};
use alpn_gateway::lifecycle::{shutdown_signal, Shutdown};
use alpn_gateway::net::listener::Listener;
use alpn_gateway::net::tls::load_tls_config;
use alpn_gateway::observability::{logging, metrics};
use alpn_gateway::HttpServer;

/// TLS gateway negotiating HTTP/2 or HTTP/1.1 per connection.
#[derive(Debug, Parser)]
#[command(name = "alpn-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::Validation(errors)) => {
            for error in &errors {
                eprintln!("invalid configuration: {error}");
            }
            return Err(format!("{} configuration error(s)", errors.len()).into());
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "alpn-gateway starting"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let tls_config = config
        .listener
        .tls
        .as_ref()
        .ok_or("listener.tls is required")?;
    let tls = load_tls_config(tls_config)?;

    let listener = Listener::bind(&config.listener).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        fallback = %config.negotiation.fallback_protocol,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    HttpServer::new(config, tls)?
        .run(listener, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
