//! Client adapters: `IdpClient` (synchronous, retrying) and `IdpAsyncClient`
//! (pipelined, no retry). Both connect a single DEALER socket to the
//! broker's ROUTER, per the unified-client redesign in `SPEC_FULL.md` §12
//! item 8. Grounded in `idcliapi.h`'s `idcli_send`/`idcli_send2`/`idcli_recv2`.

use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::DealerSocket;

use crate::codec::{encode_from_client, frames_of};
use crate::config::ClientConfig;
use crate::error::IdpError;
use crate::protocol::CLIENT_HEADER;
use crate::transport::Transport;

/// Synchronous request/reply client. `request` sends, waits up to
/// `timeout`, and on silence reconnects and retries up to `retries` times
/// before giving up — mirrors `idcli_send`.
pub struct IdpClient {
    socket: DealerSocket,
    transport: Transport,
    config: ClientConfig,
}

impl IdpClient {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: Transport, config: ClientConfig) -> Result<Self, IdpError> {
        let socket = Self::dial(&transport).await?;
        Ok(Self {
            socket,
            transport,
            config,
        })
    }

    async fn dial(transport: &Transport) -> Result<DealerSocket, IdpError> {
        let mut socket = DealerSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!(endpoint = %transport, "connected to broker");
        Ok(socket)
    }

    async fn reconnect(&mut self) -> Result<(), IdpError> {
        warn!("no reply, reconnecting");
        self.socket = Self::dial(&self.transport).await?;
        Ok(())
    }

    /// Sends `payload` to `service` and returns the reply payload frames,
    /// retrying on silence up to `config.retries` times (spec §4.9).
    #[instrument(skip(self, payload), fields(service = %service))]
    pub async fn request(
        &mut self,
        service: &str,
        payload: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, IdpError> {
        let mut retries_left = self.config.retries;
        let request = encode_from_client(service.as_bytes(), &payload);

        loop {
            if let Err(e) = self.socket.send(request.clone()).await {
                warn!(error = %e, "send failed");
            } else {
                debug!("sent request");
            }

            let outcome = tokio::time::timeout(self.config.timeout(), self.socket.recv()).await;

            match outcome {
                Ok(Ok(msg)) => {
                    return decode_reply(service, msg);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "recv error");
                }
                Err(_) => {
                    // timed out
                }
            }

            retries_left = retries_left.saturating_sub(1);
            if retries_left == 0 {
                return Err(IdpError::SendFailed {
                    retries: self.config.retries,
                });
            }
            self.reconnect().await?;
        }
    }
}

/// Pipelined client: `send` and `recv` are decoupled, with no retry. The
/// caller is responsible for matching requests to replies (the protocol
/// carries no correlation id beyond FIFO ordering per service). Mirrors
/// `idcli_send2`/`idcli_recv2`.
pub struct IdpAsyncClient {
    socket: DealerSocket,
    timeout: std::time::Duration,
}

impl IdpAsyncClient {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport, config: ClientConfig) -> Result<Self, IdpError> {
        let mut socket = DealerSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!(endpoint = %transport, "connected to broker (async mode)");
        Ok(Self {
            socket,
            timeout: config.timeout(),
        })
    }

    #[instrument(skip(self, payload), fields(service = %service))]
    pub async fn send(&mut self, service: &str, payload: Vec<Vec<u8>>) -> Result<(), IdpError> {
        let msg = encode_from_client(service.as_bytes(), &payload);
        self.socket.send(msg).await?;
        Ok(())
    }

    /// Waits up to the configured timeout for the next reply. Returns
    /// `Ok(None)` on timeout (not an error: the caller decides whether to
    /// keep waiting or give up, unlike the retrying `IdpClient`).
    pub async fn recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, IdpError> {
        match tokio::time::timeout(self.timeout, self.socket.recv()).await {
            Ok(Ok(msg)) => decode_async_reply(msg).map(Some),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}

/// Strips `[empty, IDPC01, service, ...payload]` from a reply and checks
/// the service name matches, per `idcli_send`. Both client modes share
/// `encode_from_client`'s REQ-emulation leading empty frame
/// (`SPEC_FULL.md` §12 item 8 unifies the two modes on one DEALER socket),
/// so both see it echoed back by the broker's `encode_to_client`.
fn decode_reply(expected_service: &str, msg: zeromq::ZmqMessage) -> Result<Vec<Vec<u8>>, IdpError> {
    let frames = frames_of(&msg);
    if frames.len() < 3 {
        return Err(IdpError::MalformedEnvelope(format!(
            "reply needs at least 3 frames, got {}",
            frames.len()
        )));
    }
    if !frames[0].is_empty() {
        return Err(IdpError::MalformedEnvelope(
            "reply missing empty delimiter".into(),
        ));
    }
    if frames[1] != CLIENT_HEADER {
        return Err(IdpError::MalformedEnvelope(format!(
            "expected client header {:?}, got {:?}",
            CLIENT_HEADER, frames[1]
        )));
    }
    if frames[2] != expected_service.as_bytes() {
        return Err(IdpError::MalformedEnvelope(format!(
            "expected service {:?}, got {:?}",
            expected_service, frames[2]
        )));
    }
    Ok(frames[3..].to_vec())
}

/// Strips `[empty, IDPC01, service, ...payload]` from a reply — the leading
/// empty frame is the REQ-emulation delimiter that `encode_from_client`
/// pushes on send, echoed back by the broker's `encode_to_client`.
fn decode_async_reply(msg: zeromq::ZmqMessage) -> Result<Vec<Vec<u8>>, IdpError> {
    let frames = frames_of(&msg);
    if frames.len() < 3 {
        return Err(IdpError::MalformedEnvelope(format!(
            "reply needs at least 3 frames, got {}",
            frames.len()
        )));
    }
    if !frames[0].is_empty() {
        return Err(IdpError::MalformedEnvelope(
            "reply missing empty delimiter".into(),
        ));
    }
    if frames[1] != CLIENT_HEADER {
        return Err(IdpError::MalformedEnvelope(format!(
            "expected client header {:?}, got {:?}",
            CLIENT_HEADER, frames[1]
        )));
    }
    Ok(frames[3..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message_of;

    #[test]
    fn decode_reply_strips_header_and_service() {
        let msg = message_of(vec![
            vec![],
            CLIENT_HEADER.to_vec(),
            b"echo".to_vec(),
            b"hi".to_vec(),
        ]);
        let payload = decode_reply("echo", msg).unwrap();
        assert_eq!(payload, vec![b"hi".to_vec()]);
    }

    #[test]
    fn decode_reply_rejects_wrong_service() {
        let msg = message_of(vec![
            vec![],
            CLIENT_HEADER.to_vec(),
            b"other".to_vec(),
            b"hi".to_vec(),
        ]);
        assert!(decode_reply("echo", msg).is_err());
    }

    #[test]
    fn decode_async_reply_strips_envelope() {
        let msg = message_of(vec![
            vec![],
            CLIENT_HEADER.to_vec(),
            b"echo".to_vec(),
            b"hi".to_vec(),
        ]);
        let payload = decode_async_reply(msg).unwrap();
        assert_eq!(payload, vec![b"hi".to_vec()]);
    }
}
