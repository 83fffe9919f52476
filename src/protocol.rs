//! Wire-level constants for the Irondomo Protocol.
//!
//! Header strings and command bytes are bit-exact with the reference
//! implementation; see `idp_common.h` in the protocol's C heritage.

/// Protocol header sent by clients: `IDPC01`.
pub const CLIENT_HEADER: &[u8] = b"IDPC01";

/// Protocol header sent by workers: `IDPW01`.
pub const WORKER_HEADER: &[u8] = b"IDPW01";

/// Reserved service-name prefix for the management interface.
pub const MMI_PREFIX: &[u8] = b"mmi.";

/// Worker command bytes.
pub mod command {
    pub const READY: u8 = 0x01;
    pub const REQUEST: u8 = 0x02;
    pub const REPLY: u8 = 0x03;
    pub const HEARTBEAT: u8 = 0x04;
    pub const DISCONNECT: u8 = 0x05;
}

/// Returns a human-readable name for a worker command byte, for logging.
pub fn command_name(byte: u8) -> &'static str {
    match byte {
        command::READY => "READY",
        command::REQUEST => "REQUEST",
        command::REPLY => "REPLY",
        command::HEARTBEAT => "HEARTBEAT",
        command::DISCONNECT => "DISCONNECT",
        _ => "UNKNOWN",
    }
}

/// Default heartbeat interval, in milliseconds.
pub const HEARTBEAT_INTERVAL_MS: u64 = 2500;

/// Default heartbeat liveness (missed heartbeats tolerated before purge).
pub const HEARTBEAT_LIVENESS: u32 = 3;

/// Default client request timeout, in milliseconds.
pub const CLIENT_TIMEOUT_MS: u64 = 2500;

/// Default client retry count.
pub const CLIENT_RETRIES: u32 = 3;

/// Default worker reconnect delay, in milliseconds.
pub const WORKER_RECONNECT_MS: u64 = 2500;

/// Which physical socket a peer is reachable on.
///
/// Fixed at a worker's first appearance (its READY); carried on a client
/// request from whichever socket it arrived on. Carrying this as an
/// out-of-band tag (rather than overloading the worker command byte with
/// `REQUEST_CURVE`/`REPLY_CURVE` wire variants) is the redesign this crate
/// takes — see `SPEC_FULL.md` §12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Clear,
    Curve,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Clear => "clear",
            Channel::Curve => "curve",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
