//! idp-echo-client — sends a handful of requests to the `echo` service and
//! prints the replies.
//!
//! Illustrative only; demonstrates the `IdpClient` adapter. Grounded in the
//! reference `client_clear.c` example.

use clap::Parser;
use irondomo::{ClientConfig, Transport};

#[derive(Parser, Debug)]
#[command(name = "idp-echo-client", version, about)]
struct Cli {
    /// Broker clear-channel host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Broker clear-channel port.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Service name to call.
    #[arg(long, default_value = "echo")]
    service: String,

    /// Number of requests to send.
    #[arg(long, default_value_t = 10)]
    count: u32,
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
    let mut client = irondomo::IdpClient::connect(transport, ClientConfig::default()).await?;

    let mut completed = 0;
    for _ in 0..cli.count {
        let request = vec![b"Hello".to_vec(), b" ".to_vec(), b"world".to_vec()];
        match client.request(&cli.service, request).await {
            Ok(reply) => {
                let text: Vec<String> = reply
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect();
                tracing::info!(reply = ?text, "received reply");
                completed += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "request failed, stopping");
                break;
            }
        }
    }

    println!("{completed} requests/replies processed");
    Ok(())
}
