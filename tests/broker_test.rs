//! End-to-end broker tests over the clear channel: echo round-trip and
//! fair dispatch across multiple workers.

use std::time::Duration;

use irondomo::{Broker, BrokerConfig, ClientConfig, IdpClient, IdpWorker, Transport, WorkerConfig};
use tokio::sync::watch;

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_broker(port: u16) -> (Transport, watch::Sender<bool>) {
    let transport = Transport::tcp("127.0.0.1", port);
    let config = BrokerConfig {
        clear_port: port,
        ..Default::default()
    };
    let broker = Broker::bind(config).await.unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        broker.run(rx).await.unwrap();
    });
    tokio::time::sleep(SETTLE).await;
    (transport, tx)
}

#[tokio::test]
async fn echo_roundtrip_over_clear_channel() {
    let (transport, shutdown) = spawn_broker(18500).await;

    let worker_handle = tokio::spawn({
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

    let request = vec![b"Hello".to_vec(), b" ".to_vec(), b"world".to_vec()];
    let reply = tokio::time::timeout(TIMEOUT, client.request("echo", request.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, request);

    worker_handle.abort();
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn dispatch_alternates_between_idle_workers_fifo() {
    let (transport, shutdown) = spawn_broker(18501).await;

    let mut worker_handles = Vec::new();
    for tag in ["w1", "w2"] {
        let transport = transport.clone();
        worker_handles.push(tokio::spawn(async move {
            let mut worker = IdpWorker::connect(transport, "tag", WorkerConfig::default())
                .await
                .unwrap();
            let mut reply = None;
            loop {
                let _request = worker.recv(reply.take()).await.unwrap();
                reply = Some(vec![tag.as_bytes().to_vec()]);
            }
        }));
        // Register sequentially so FIFO order is deterministic: w1 then w2.
        tokio::time::sleep(SETTLE).await;
    }

    let mut client = IdpClient::connect(transport, ClientConfig::default())
        .await
        .unwrap();

    let mut tags = Vec::new();
    for _ in 0..4 {
        let reply = tokio::time::timeout(TIMEOUT, client.request("tag", vec![b"ping".to_vec()]))
            .await
            .unwrap()
            .unwrap();
        tags.push(String::from_utf8(reply[0].clone()).unwrap());
    }

    assert_eq!(tags, vec!["w1", "w2", "w1", "w2"]);

    for handle in worker_handles {
        handle.abort();
    }
    let _ = shutdown.send(true);
}
