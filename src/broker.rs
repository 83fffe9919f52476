//! The broker core: protocol state machine and dispatch loop.
//!
//! Classifies each inbound message as client or worker traffic, drives the
//! worker lifecycle, dispatches queued requests to idle workers, emits
//! heartbeats, and purges expired workers. See spec §4.3-§4.8.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use zeromq::ZmqMessage;

use crate::codec::{
    decode_client_frames, decode_worker_frames, encode_to_client, encode_to_worker, frames_of,
};
use crate::config::BrokerConfig;
use crate::error::IdpError;
use crate::protocol::{command, command_name, Channel, MMI_PREFIX};
use crate::registry::{PendingRequest, Registry};
use crate::transport::{BrokerSockets, CurveCredentials, Readable, Transport};

/// The central routing process. Owns both sockets and both registries;
/// single-threaded, event-driven — see spec §5.
pub struct Broker {
    sockets: BrokerSockets,
    registry: Registry,
    config: BrokerConfig,
    heartbeat_at: Instant,
}

impl Broker {
    pub async fn bind(config: BrokerConfig) -> Result<Self, IdpError> {
        let clear = config.clear_transport();
        let curve = config.curve_transport();
        let credentials = match (&config.curve_public_key, &config.curve_secret_key) {
            (Some(public), Some(secret)) => {
                Some(CurveCredentials::new(public.clone(), secret.clone()))
            }
            _ => None,
        };
        let sockets = BrokerSockets::bind(&clear, curve.as_ref(), credentials).await?;
        let heartbeat_at = Instant::now() + config.heartbeat_interval();
        Ok(Self {
            sockets,
            registry: Registry::new(),
            config,
            heartbeat_at,
        })
    }

    /// Runs the main loop to completion. `shutdown` is the explicit
    /// cancellation token described in `SPEC_FULL.md` §12 item 3 (in place
    /// of the reference implementation's process-wide interrupt flag).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IdpError> {
        loop {
            if *shutdown.borrow() {
                info!("shutdown signal received, exiting main loop");
                return Ok(());
            }

            let timeout = self.config.heartbeat_interval();
            tokio::select! {
                readable = self.sockets.poll(timeout) => {
                    if let Some((channel, msg)) = readable {
                        self.receive_and_handle(channel, msg).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown signal received, exiting main loop");
                        return Ok(());
                    }
                }
            }

            // Unconditional per spec §4.3 step 3: purge + heartbeat run at
            // least once per heartbeat_interval regardless of traffic.
            if Instant::now() >= self.heartbeat_at {
                self.purge().await;
                self.broadcast_heartbeat().await;
                self.heartbeat_at = Instant::now() + self.config.heartbeat_interval();
            }
        }
    }

    async fn receive_and_handle(&mut self, channel: Readable, msg: ZmqMessage) {
        let channel_enum = match channel {
            Readable::Clear => Channel::Clear,
            Readable::Curve => Channel::Curve,
        };
        if let Err(e) = self.handle_message(channel_enum, msg).await {
            warn!(error = %e, "dropping malformed message");
        }
    }

    #[instrument(skip(self, msg), fields(channel = %channel))]
    async fn handle_message(&mut self, channel: Channel, msg: ZmqMessage) -> Result<(), IdpError> {
        let frames = frames_of(&msg);
        if frames.is_empty() {
            return Err(IdpError::MalformedEnvelope("empty message".into()));
        }
        let identity = frames[0].clone();
        let rest = &frames[1..];
        if rest.len() < 2 {
            return Err(IdpError::MalformedEnvelope(
                "message has no header frame".into(),
            ));
        }

        match rest[1].as_slice() {
            crate::protocol::WORKER_HEADER => {
                let frame = decode_worker_frames(rest)?;
                self.handle_worker_message(channel, identity, frame.command, frame.rest)
                    .await;
            }
            crate::protocol::CLIENT_HEADER => {
                let frame = decode_client_frames(rest)?;
                self.handle_client_message(channel, identity, frame.service, frame.payload)
                    .await;
            }
            other => {
                return Err(IdpError::MalformedEnvelope(format!(
                    "unknown protocol header {:?}",
                    other
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, rest), fields(identity = %hex::encode(&identity), command = command_name(command)))]
    async fn handle_worker_message(
        &mut self,
        channel: Channel,
        identity: Vec<u8>,
        command: u8,
        rest: Vec<Vec<u8>>,
    ) {
        let was_registered = self.registry.worker_exists(&identity);

        match command {
            command::READY => {
                if was_registered {
                    warn!("duplicate READY, disconnecting");
                    self.delete_worker(&identity, channel, true).await;
                    return;
                }
                if identity.starts_with(MMI_PREFIX) {
                    warn!("worker identity uses reserved mmi. prefix, disconnecting");
                    self.delete_worker(&identity, channel, true).await;
                    return;
                }
                let service = rest[0].clone();
                let expiry = Instant::now() + self.config.heartbeat_expiry();
                self.registry
                    .register_worker(identity.clone(), service.clone(), channel, expiry);
                info!(service = %String::from_utf8_lossy(&service), "worker registered");
                self.dispatch(&service).await;
            }
            command::REPLY => {
                if !was_registered {
                    warn!("REPLY from unregistered worker, disconnecting");
                    self.delete_worker(&identity, channel, true).await;
                    return;
                }
                let client_identity = rest[0].clone();
                let payload = rest[2..].to_vec();
                let service = self
                    .registry
                    .worker(&identity)
                    .map(|w| w.service.clone())
                    .unwrap_or_default();
                let reply_channel = self
                    .registry
                    .take_reply_channel(&identity)
                    .unwrap_or(channel);
                let reply = encode_to_client(&client_identity, &service, &payload);
                if let Err(e) = self.sockets.send(reply_channel, reply).await {
                    warn!(error = %e, "failed to relay reply to client");
                }
                let expiry = Instant::now() + self.config.heartbeat_expiry();
                self.registry.worker_waiting(&identity, expiry);
                self.dispatch(&service).await;
            }
            command::HEARTBEAT => {
                if was_registered {
                    let expiry = Instant::now() + self.config.heartbeat_expiry();
                    self.registry.extend_expiry(&identity, expiry);
                } else {
                    self.delete_worker(&identity, channel, true).await;
                }
            }
            command::DISCONNECT => {
                self.registry.delete_worker(&identity);
            }
            other => {
                warn!(command = other, "unrecognized worker command, dropping");
            }
        }
    }

    #[instrument(skip(self, payload), fields(identity = %hex::encode(&identity), service = %String::from_utf8_lossy(&service)))]
    async fn handle_client_message(
        &mut self,
        channel: Channel,
        identity: Vec<u8>,
        service: Vec<u8>,
        payload: Vec<Vec<u8>>,
    ) {
        if service.starts_with(MMI_PREFIX) {
            self.handle_mmi(channel, identity, service, payload).await;
            return;
        }
        let request = PendingRequest {
            client_identity: identity,
            payload,
            channel,
        };
        self.registry.enqueue_request(&service, request);
        self.dispatch(&service).await;
    }

    /// spec §4.5: `mmi.service` answers 200/404 by worker presence; any
    /// other `mmi.*` answers 501.
    async fn handle_mmi(
        &mut self,
        channel: Channel,
        identity: Vec<u8>,
        service: Vec<u8>,
        payload: Vec<Vec<u8>>,
    ) {
        let code: &[u8] = if service == b"mmi.service" {
            let queried = payload.last().cloned().unwrap_or_default();
            let has_workers = self
                .registry
                .service(&queried)
                .map(|s| s.worker_count > 0)
                .unwrap_or(false);
            if has_workers {
                b"200"
            } else {
                b"404"
            }
        } else {
            b"501"
        };

        let mut reply_payload = payload;
        match reply_payload.last_mut() {
            Some(last) => *last = code.to_vec(),
            None => reply_payload.push(code.to_vec()),
        }

        let reply = encode_to_client(&identity, &service, &reply_payload);
        if let Err(e) = self.sockets.send(channel, reply).await {
            warn!(error = %e, "failed to send MMI reply");
        }
    }

    /// spec §4.6: while idle workers and pending requests both exist,
    /// dispatch FIFO-to-FIFO, purging first since it's cheap.
    async fn dispatch(&mut self, service: &[u8]) {
        loop {
            self.purge().await;
            if !self.registry.has_idle_worker(service) || !self.registry.has_pending_request(service)
            {
                break;
            }
            let worker_identity = match self.registry.pop_idle_worker(service) {
                Some(id) => id,
                None => break,
            };
            let request = match self.registry.pop_request(service) {
                Some(r) => r,
                None => break,
            };
            let worker_channel = self
                .registry
                .worker(&worker_identity)
                .map(|w| w.channel)
                .unwrap_or(Channel::Clear);
            self.registry
                .set_reply_channel(&worker_identity, request.channel);

            let mut rest = Vec::with_capacity(2 + request.payload.len());
            rest.push(request.client_identity);
            rest.push(Vec::new());
            rest.extend(request.payload);

            let msg = encode_to_worker(&worker_identity, command::REQUEST, &rest);
            if let Err(e) = self.sockets.send(worker_channel, msg).await {
                warn!(error = %e, "failed to dispatch request to worker");
            }
        }
    }

    /// spec §4.7: O(k) in the number of expired workers; silent, no
    /// DISCONNECT sent (the peer is presumed gone).
    async fn purge(&mut self) {
        let expired = self.registry.purge_expired(Instant::now());
        for identity in expired {
            debug!(identity = %hex::encode(&identity), "purged expired worker");
        }
    }

    /// spec §4.8: HEARTBEAT to every idle worker; busy workers are not
    /// heartbeated (their pending REPLY is their liveness signal).
    async fn broadcast_heartbeat(&mut self) {
        let identities: Vec<Vec<u8>> = self.registry.idle_worker_identities().cloned().collect();
        for identity in identities {
            let channel = self.registry.worker(&identity).map(|w| w.channel);
            if let Some(channel) = channel {
                let msg = encode_to_worker(&identity, command::HEARTBEAT, &[]);
                if let Err(e) = self.sockets.send(channel, msg).await {
                    warn!(error = %e, "failed to send heartbeat");
                }
            }
        }
    }

    /// Disconnects a peer. `channel` is the channel the triggering message
    /// arrived on, not looked up from the registry — a record may not exist
    /// yet (duplicate READY, reserved-prefix rejection), and the channel a
    /// message arrived on is always the right one to notify it back on.
    async fn delete_worker(&mut self, identity: &[u8], channel: Channel, notify: bool) {
        if notify {
            let msg = encode_to_worker(identity, command::DISCONNECT, &[]);
            let _ = self.sockets.send(channel, msg).await;
        }
        self.registry.delete_worker(identity);
    }

    /// True if `name` currently has at least one registered worker.
    pub fn service_has_workers(&self, name: &[u8]) -> bool {
        self.registry
            .service(name)
            .map(|s| s.worker_count > 0)
            .unwrap_or(false)
    }

    pub fn clear_endpoint(&self) -> Transport {
        self.config.clear_transport()
    }
}
