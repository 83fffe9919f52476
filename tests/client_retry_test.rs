//! A client talking to a service with no registered workers retries up to
//! its configured limit, then reports `SendFailed`.

use std::time::Duration;

use irondomo::{Broker, BrokerConfig, ClientConfig, IdpClient, IdpError, Transport};
use tokio::sync::watch;

const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn request_to_empty_service_exhausts_retries() {
    let transport = Transport::tcp("127.0.0.1", 18530);
    let config = BrokerConfig {
        clear_port: 18530,
        ..Default::default()
    };
    let broker = Broker::bind(config).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        broker.run(rx).await.unwrap();
    });
    tokio::time::sleep(SETTLE).await;

    let client_config = ClientConfig {
        timeout_ms: 150,
        retries: 2,
    };
    let mut client = IdpClient::connect(transport, client_config).await.unwrap();

    let result = client
        .request("no-such-service", vec![b"ping".to_vec()])
        .await;

    match result {
        Err(IdpError::SendFailed { retries }) => assert_eq!(retries, 2),
        other => panic!("expected SendFailed, got {other:?}"),
    }
}
