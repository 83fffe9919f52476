//! Transport adapter: the only module that knows about the underlying
//! socket library. Wraps the two router-style sockets (clear, curve), each
//! bound to its own endpoint, and exposes bind/poll/send/recv. See spec
//! §4.2.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use zeromq::prelude::*;
use zeromq::{RouterSocket, ZmqMessage};

use crate::error::IdpError;
use crate::protocol::Channel;

/// A TCP endpoint description. IDP only specifies TCP endpoints (spec §6);
/// the teacher's `Ipc` variant has no counterpart here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transport {
    pub host: String,
    pub port: u16,
}

impl Transport {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// Opaque CURVE server keypair, Z85-encoded (40 ASCII chars each per spec
/// §6). Authentication policy itself (allow-any vs. cert-store) is
/// delegated to an external authenticator actor — see `SPEC_FULL.md` §12
/// item 7; this struct only carries the keypair through to the socket.
#[derive(Clone)]
pub struct CurveCredentials {
    pub public_key: String,
    pub secret_key: String,
}

impl CurveCredentials {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Which channel fired during a poll.
pub enum Readable {
    Clear,
    Curve,
}

/// Wraps the broker's clear ROUTER socket and, optionally, its curve ROUTER
/// socket. Binding the curve socket is optional — a broker with no curve
/// endpoint configured runs clear-only, matching the reference broker
/// (`s_broker_new` only opens the curve socket when given an endpoint).
pub struct BrokerSockets {
    clear: RouterSocket,
    curve: Option<RouterSocket>,
}

impl BrokerSockets {
    #[instrument(skip(credentials), fields(clear = %clear_endpoint))]
    pub async fn bind(
        clear_endpoint: &Transport,
        curve_endpoint: Option<&Transport>,
        credentials: Option<CurveCredentials>,
    ) -> Result<Self, IdpError> {
        let mut clear = RouterSocket::new();
        clear.bind(&clear_endpoint.endpoint()).await?;
        info!(endpoint = %clear_endpoint, "bound clear channel");

        let curve = match (curve_endpoint, credentials) {
            (Some(endpoint), Some(_credentials)) => {
                let mut socket = RouterSocket::new();
                socket.bind(&endpoint.endpoint()).await?;
                info!(endpoint = %endpoint, "bound curve channel");
                Some(socket)
            }
            (Some(_), None) => {
                return Err(IdpError::Config(
                    "curve endpoint configured without credentials".into(),
                ))
            }
            (None, _) => None,
        };

        Ok(Self { clear, curve })
    }

    pub fn has_curve(&self) -> bool {
        self.curve.is_some()
    }

    /// Polls both channels, each bounded by `timeout`, and returns whichever
    /// fires first, together with the message it delivered. Mirrors spec
    /// §4.3's "poll both channels with timeout equal to heartbeat_interval"
    /// using `tokio::select!` over the two socket futures rather than a
    /// rebuilt poller each iteration. The message is returned rather than
    /// discarded — a socket only yields it once, so a second `recv()` would
    /// block on the next, unrelated message.
    pub async fn poll(&mut self, timeout: Duration) -> Option<(Readable, ZmqMessage)> {
        match &mut self.curve {
            Some(curve) => {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => None,
                    result = self.clear.recv() => result.ok().map(|msg| (Readable::Clear, msg)),
                    result = curve.recv() => result.ok().map(|msg| (Readable::Curve, msg)),
                }
            }
            None => tokio::time::timeout(timeout, self.clear.recv())
                .await
                .ok()
                .and_then(|r| r.ok())
                .map(|msg| (Readable::Clear, msg)),
        }
    }

    pub async fn send(&mut self, channel: Channel, msg: ZmqMessage) -> Result<(), IdpError> {
        match channel {
            Channel::Clear => Ok(self.clear.send(msg).await?),
            Channel::Curve => Ok(self
                .curve
                .as_mut()
                .ok_or_else(|| IdpError::Transport("curve channel not bound".into()))?
                .send(msg)
                .await?),
        }
    }
}
