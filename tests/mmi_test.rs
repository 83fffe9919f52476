//! Management interface tests: `mmi.service` worker-presence lookup and
//! the catch-all 501 for any other `mmi.*` request.

use std::time::Duration;

use irondomo::{Broker, BrokerConfig, ClientConfig, IdpClient, IdpWorker, Transport, WorkerConfig};
use tokio::sync::watch;

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_broker(port: u16) -> Transport {
    let transport = Transport::tcp("127.0.0.1", port);
    let config = BrokerConfig {
        clear_port: port,
        ..Default::default()
    };
    let broker = Broker::bind(config).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        broker.run(rx).await.unwrap();
    });
    tokio::time::sleep(SETTLE).await;
    transport
}

#[tokio::test]
async fn mmi_service_reports_200_when_workers_present() {
    let transport = spawn_broker(18510).await;

    let _worker_handle = tokio::spawn({
        let transport = transport.clone();
        async move {
            let mut worker = IdpWorker::connect(transport, "echo", WorkerConfig::default())
                .await
                .unwrap();
            let mut reply = None;
            loop {
                let request = worker.recv(reply.take()).await.unwrap();
                reply = Some(request);
            }
        }
    });
    tokio::time::sleep(SETTLE).await;

    let mut client = IdpClient::connect(transport, ClientConfig::default())
        .await
        .unwrap();

    let reply = tokio::time::timeout(
        TIMEOUT,
        client.request("mmi.service", vec![b"echo".to_vec()]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.last().unwrap(), b"200");
}

#[tokio::test]
async fn mmi_service_reports_404_for_unknown_service() {
    let transport = spawn_broker(18511).await;
    let mut client = IdpClient::connect(transport, ClientConfig::default())
        .await
        .unwrap();

    let reply = tokio::time::timeout(
        TIMEOUT,
        client.request("mmi.service", vec![b"no-such-service".to_vec()]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.last().unwrap(), b"404");
}

#[tokio::test]
async fn unrecognized_mmi_request_reports_501() {
    let transport = spawn_broker(18512).await;
    let mut client = IdpClient::connect(transport, ClientConfig::default())
        .await
        .unwrap();

    let reply = tokio::time::timeout(TIMEOUT, client.request("mmi.stats", vec![b"x".to_vec()]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.last().unwrap(), b"501");
}
