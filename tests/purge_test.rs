//! A worker that registers and then stops heartbeating is purged once its
//! expiry (heartbeat_interval * heartbeat_liveness) passes.

use std::time::Duration;

use irondomo::codec::encode_from_worker;
use irondomo::protocol::command;
use irondomo::{Broker, BrokerConfig, ClientConfig, IdpClient, Transport};
use tokio::sync::watch;
use zeromq::prelude::*;
use zeromq::DealerSocket;

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn silent_worker_is_purged_after_expiry() {
    let transport = Transport::tcp("127.0.0.1", 18520);
    let config = BrokerConfig {
        clear_port: 18520,
        heartbeat_interval_ms: 100,
        heartbeat_liveness: 2,
        ..Default::default()
    };
    let broker = Broker::bind(config).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        broker.run(rx).await.unwrap();
    });
    tokio::time::sleep(SETTLE).await;

    // Register directly on a raw DEALER socket; never send HEARTBEAT.
    let mut socket = DealerSocket::new();
    socket.connect(&transport.endpoint()).await.unwrap();
    let ready = encode_from_worker(command::READY, &[b"flaky".to_vec()]);
    socket.send(ready).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let mut client = IdpClient::connect(transport.clone(), ClientConfig::default())
        .await
        .unwrap();
    let reply = tokio::time::timeout(
        TIMEOUT,
        client.request("mmi.service", vec![b"flaky".to_vec()]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.last().unwrap(), b"200");

    // Expiry = 100ms * 2 = 200ms; wait past it plus margin for a purge tick.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let reply = tokio::time::timeout(
        TIMEOUT,
        client.request("mmi.service", vec![b"flaky".to_vec()]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.last().unwrap(), b"404");
}
