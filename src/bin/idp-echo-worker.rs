//! idp-echo-worker — minimal worker that echoes back whatever it receives.
//!
//! Illustrative only; demonstrates the `IdpWorker` adapter. Grounded in the
//! reference `worker_clear.c` example.

use clap::Parser;
use irondomo::{Transport, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "idp-echo-worker", version, about)]
struct Cli {
    /// Broker clear-channel host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Broker clear-channel port.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Service name to register under.
    #[arg(long, default_value = "echo")]
    service: String,
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
    let transport = Transport::tcp(cli.host, cli.port);
    let mut worker =
        irondomo::IdpWorker::connect(transport, cli.service, WorkerConfig::default()).await?;

    tracing::info!(identity = %worker.identity(), "echo worker ready");

    let mut reply = None;
    loop {
        let request = worker.recv(reply.take()).await?;
        reply = Some(request);
    }
}
