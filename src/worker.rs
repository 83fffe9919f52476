//! IDP worker-side adapter: the wire protocol a service implementation
//! speaks to stay registered with the broker and exchange REQUEST/REPLY
//! pairs. Grounded in `idwrkapi.h`'s `idwrk_recv`/`idwrk_connect_to_broker`.

use std::time::Instant;

use tracing::{info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::DealerSocket;

use crate::codec::{encode_from_worker, frames_of};
use crate::config::WorkerConfig;
use crate::error::IdpError;
use crate::protocol::{command, WORKER_HEADER};
use crate::transport::Transport;

/// Connects as a named service, answers REQUESTs with REPLYs, and
/// maintains liveness with the broker via HEARTBEAT. One `IdpWorker`
/// handles one service on one channel (spec §4.10).
pub struct IdpWorker {
    socket: DealerSocket,
    transport: Transport,
    service: String,
    identity: String,
    config: WorkerConfig,
    liveness: u32,
    heartbeat_at: Instant,
    /// The client envelope frames to wrap the next reply with, saved off
    /// the REQUEST that's currently being answered. `idwrk_recv` calls this
    /// `_reply_to_clear`/`_reply_to_curve`; this crate only needs one slot
    /// since a worker is pinned to a single channel for its whole lifetime.
    reply_envelope: Option<Vec<Vec<u8>>>,
}

impl IdpWorker {
    /// Connects to `transport` offering `service`, with a worker identity of
    /// `<service>_<suffix>` where `suffix` is the first 8 hex characters of
    /// a random UUID (`SPEC_FULL.md` §12 item 4 — avoids collisions between
    /// multiple worker processes serving the same service), per spec §4.10.
    #[instrument(skip(config), fields(endpoint = %transport, service = %service))]
    pub async fn connect(
        transport: Transport,
        service: impl Into<String>,
        config: WorkerConfig,
    ) -> Result<Self, IdpError> {
        let service = service.into();
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let identity = format!("{service}_{suffix}");
        let socket = Self::dial(&transport, &identity, &service).await?;
        Ok(Self {
            socket,
            transport,
            service,
            identity,
            config,
            liveness: config.liveness,
            heartbeat_at: Instant::now() + config.heartbeat(),
            reply_envelope: None,
        })
    }

    async fn dial(
        transport: &Transport,
        identity: &str,
        service: &str,
    ) -> Result<DealerSocket, IdpError> {
        let mut socket = DealerSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!(endpoint = %transport, identity = %identity, "connected to broker");
        let ready = encode_from_worker(command::READY, &[service.as_bytes().to_vec()]);
        socket.send(ready).await?;
        Ok(socket)
    }

    async fn reconnect(&mut self) -> Result<(), IdpError> {
        warn!("disconnected from broker, retrying");
        tokio::time::sleep(self.config.reconnect_delay()).await;
        self.socket = Self::dial(&self.transport, &self.identity, &self.service).await?;
        self.liveness = self.config.liveness;
        self.heartbeat_at = Instant::now() + self.config.heartbeat();
        self.reply_envelope = None;
        Ok(())
    }

    /// Sends `reply` (if any) for the previously received request, then
    /// blocks until the next REQUEST arrives, returning its payload. Runs
    /// forever, transparently reconnecting on heartbeat timeout — callers
    /// that want a clean stop should wrap this in their own cancellation.
    pub async fn recv(&mut self, reply: Option<Vec<Vec<u8>>>) -> Result<Vec<Vec<u8>>, IdpError> {
        if let Some(payload) = reply {
            let envelope = self.reply_envelope.take().ok_or_else(|| {
                IdpError::MalformedEnvelope("reply given with no pending request".into())
            })?;
            let mut rest = envelope;
            rest.extend(payload);
            let msg = encode_from_worker(command::REPLY, &rest);
            self.socket.send(msg).await?;
        }

        loop {
            let outcome = tokio::time::timeout(self.config.heartbeat(), self.socket.recv()).await;

            match outcome {
                Ok(Ok(msg)) => {
                    self.liveness = self.config.liveness;
                    if let Some(payload) = self.handle_broker_message(msg).await? {
                        return Ok(payload);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "recv error from broker");
                    self.liveness = self.liveness.saturating_sub(1);
                }
                Err(_) => {
                    self.liveness = self.liveness.saturating_sub(1);
                }
            }

            if self.liveness == 0 {
                self.reconnect().await?;
            }

            if Instant::now() >= self.heartbeat_at {
                let hb = encode_from_worker(command::HEARTBEAT, &[]);
                self.socket.send(hb).await?;
                self.heartbeat_at = Instant::now() + self.config.heartbeat();
            }
        }
    }

    /// Processes one message from the broker. Returns `Some(payload)` if it
    /// was a REQUEST the caller should answer, `None` for anything handled
    /// internally (HEARTBEAT, DISCONNECT).
    async fn handle_broker_message(
        &mut self,
        msg: zeromq::ZmqMessage,
    ) -> Result<Option<Vec<Vec<u8>>>, IdpError> {
        let frames = frames_of(&msg);
        if frames.len() < 2 || !frames[0].is_empty() || frames[1] != WORKER_HEADER {
            return Err(IdpError::MalformedEnvelope(
                "malformed message from broker".into(),
            ));
        }
        let command = frames.get(2).and_then(|f| f.first().copied()).ok_or_else(|| {
            IdpError::MalformedEnvelope("missing command byte".into())
        })?;
        let rest = &frames[3..];

        match command {
            command::REQUEST => {
                if rest.len() < 2 {
                    return Err(IdpError::MalformedEnvelope(
                        "REQUEST missing client envelope".into(),
                    ));
                }
                self.reply_envelope = Some(vec![rest[0].clone(), rest[1].clone()]);
                Ok(Some(rest[2..].to_vec()))
            }
            command::HEARTBEAT => Ok(None),
            command::DISCONNECT => {
                self.reconnect().await?;
                Ok(None)
            }
            other => {
                warn!(command = other, "unrecognized command from broker, ignoring");
                Ok(None)
            }
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}
