//! Irondomo Protocol: a ZeroMQ broker implementing service-oriented
//! request/reply with a reliable worker lifecycle, over a clear and an
//! optional CURVE-authenticated channel.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod worker;

pub use broker::Broker;
pub use client::{IdpAsyncClient, IdpClient};
pub use config::{BrokerConfig, ClientConfig, IrondomoConfig, WorkerConfig};
pub use error::IdpError;
pub use protocol::Channel;
pub use transport::{CurveCredentials, Transport};
pub use worker::IdpWorker;
