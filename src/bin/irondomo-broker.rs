//! irondomo-broker — Irondomo Protocol broker.
//!
//! Binds a clear ROUTER channel, and optionally a second CURVE-authenticated
//! ROUTER channel, and routes REQUEST/REPLY traffic between clients and
//! workers registered under named services.
//!
//! # Usage
//!
//! ```bash
//! irondomo-broker --clear-port 5000
//!
//! # With a CURVE channel alongside the clear one
//! irondomo-broker --clear-port 5000 --curve-port 5001 \
//!     --curve-public-key <z85> --curve-secret-key <z85>
//!
//! # Via a config file (sections override in the order: file, then env)
//! irondomo-broker --config irondomo.toml
//! ```

use clap::Parser;
use irondomo::{BrokerConfig, IrondomoConfig};
use tokio::sync::watch;

/// Irondomo Protocol broker.
#[derive(Parser, Debug)]
#[command(name = "irondomo-broker", version, about)]
struct Cli {
    /// Path to a TOML config file. CLI flags and env vars still apply on top.
    #[arg(long)]
    config: Option<String>,

    /// Clear-channel bind host.
    #[arg(long, env = "IDP_BROKER_CLEAR_HOST")]
    clear_host: Option<String>,

    /// Clear-channel bind port.
    #[arg(long, env = "IDP_BROKER_CLEAR_PORT")]
    clear_port: Option<u16>,

    /// Curve-channel bind host (requires --curve-port and both keys).
    #[arg(long, env = "IDP_BROKER_CURVE_HOST")]
    curve_host: Option<String>,

    /// Curve-channel bind port.
    #[arg(long, env = "IDP_BROKER_CURVE_PORT")]
    curve_port: Option<u16>,

    /// Curve server public key (Z85).
    #[arg(long, env = "IDP_BROKER_CURVE_PUBLIC_KEY")]
    curve_public_key: Option<String>,

    /// Curve server secret key (Z85).
    #[arg(long, env = "IDP_BROKER_CURVE_SECRET_KEY")]
    curve_secret_key: Option<String>,

    /// Print activity to the log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, config: &mut BrokerConfig) {
        if let Some(host) = self.clear_host {
            config.clear_host = host;
        }
        if let Some(port) = self.clear_port {
            config.clear_port = port;
        }
        if let Some(host) = self.curve_host {
            config.curve_host = Some(host);
        }
        if let Some(port) = self.curve_port {
            config.curve_port = Some(port);
        }
        if let Some(key) = self.curve_public_key {
            config.curve_public_key = Some(key);
        }
        if let Some(key) = self.curve_secret_key {
            config.curve_secret_key = Some(key);
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let mut full_config = match &config_path {
        Some(path) => IrondomoConfig::from_file(path)?,
        None => IrondomoConfig::default(),
    };
    cli.apply(&mut full_config.broker);
    full_config.validate()?;

    tracing::info!(
        clear = %full_config.broker.clear_transport(),
        curve = ?full_config.broker.curve_transport().map(|t| t.to_string()),
        "starting irondomo-broker"
    );

    let broker = irondomo::Broker::bind(full_config.broker).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    broker.run(shutdown_rx).await?;

    tracing::info!("irondomo-broker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
