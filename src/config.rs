//! Configuration for the broker, client, and worker adapters.
//!
//! Parsed from TOML with environment variable overrides, following the
//! `IDP_<SECTION>_<KEY>` convention (mirroring the teacher's
//! `EISENBAHN_<SECTION>_<KEY>`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IdpError;
use crate::protocol::{
    CLIENT_RETRIES, CLIENT_TIMEOUT_MS, HEARTBEAT_INTERVAL_MS, HEARTBEAT_LIVENESS,
    WORKER_RECONNECT_MS,
};
use crate::transport::Transport;

/// Full broker configuration: endpoints, curve keys, heartbeat tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_clear_host")]
    pub clear_host: String,
    #[serde(default = "default_clear_port")]
    pub clear_port: u16,

    /// Curve endpoint is optional; the broker runs clear-only without it.
    pub curve_host: Option<String>,
    pub curve_port: Option<u16>,
    pub curve_public_key: Option<String>,
    pub curve_secret_key: Option<String>,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_liveness")]
    pub heartbeat_liveness: u32,

    #[serde(default)]
    pub verbose: bool,
}

fn default_clear_host() -> String {
    "127.0.0.1".into()
}
fn default_clear_port() -> u16 {
    5000
}
fn default_heartbeat_interval_ms() -> u64 {
    HEARTBEAT_INTERVAL_MS
}
fn default_heartbeat_liveness() -> u32 {
    HEARTBEAT_LIVENESS
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            clear_host: default_clear_host(),
            clear_port: default_clear_port(),
            curve_host: None,
            curve_port: None,
            curve_public_key: None,
            curve_secret_key: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_liveness: default_heartbeat_liveness(),
            verbose: false,
        }
    }
}

impl BrokerConfig {
    pub fn clear_transport(&self) -> Transport {
        Transport::tcp(self.clear_host.clone(), self.clear_port)
    }

    pub fn curve_transport(&self) -> Option<Transport> {
        Some(Transport::tcp(self.curve_host.clone()?, self.curve_port?))
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// heartbeat_interval * heartbeat_liveness, per spec §3.
    pub fn heartbeat_expiry(&self) -> std::time::Duration {
        self.heartbeat_interval() * self.heartbeat_liveness
    }

    fn validate(&self) -> Result<(), IdpError> {
        if self.heartbeat_liveness == 0 {
            return Err(IdpError::Config(
                "heartbeat_liveness must be >= 1".into(),
            ));
        }
        let curve_fields = [
            self.curve_host.is_some(),
            self.curve_port.is_some(),
            self.curve_public_key.is_some(),
            self.curve_secret_key.is_some(),
        ];
        if curve_fields.iter().any(|f| *f) && !curve_fields.iter().all(|f| *f) {
            return Err(IdpError::Config(
                "curve_host, curve_port, curve_public_key and curve_secret_key must all be set together".into(),
            ));
        }
        Ok(())
    }
}

/// Client adapter tuning (spec §4.9 / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_timeout_ms() -> u64 {
    CLIENT_TIMEOUT_MS
}
fn default_retries() -> u32 {
    CLIENT_RETRIES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// Worker adapter tuning (spec §4.10 / `SPEC_FULL.md` §11.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    #[serde(default = "default_heartbeat_liveness")]
    pub liveness: u32,
}

fn default_reconnect_ms() -> u64 {
    WORKER_RECONNECT_MS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_interval_ms(),
            reconnect_ms: default_reconnect_ms(),
            liveness: default_heartbeat_liveness(),
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }

    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_ms)
    }
}

/// Top-level config file shape, combining all three sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrondomoConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl IrondomoConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, IdpError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IdpError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Environment overrides, convention `IDP_<SECTION>_<KEY>`:
    /// - `IDP_BROKER_CLEAR_HOST` / `IDP_BROKER_CLEAR_PORT`
    /// - `IDP_BROKER_CURVE_HOST` / `IDP_BROKER_CURVE_PORT`
    /// - `IDP_BROKER_HEARTBEAT_INTERVAL_MS` / `IDP_BROKER_HEARTBEAT_LIVENESS`
    /// - `IDP_CLIENT_TIMEOUT_MS` / `IDP_CLIENT_RETRIES`
    /// - `IDP_WORKER_HEARTBEAT_MS` / `IDP_WORKER_RECONNECT_MS`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("IDP_BROKER_CLEAR_HOST") {
            self.broker.clear_host = v;
        }
        if let Ok(v) = std::env::var("IDP_BROKER_CLEAR_PORT") {
            if let Ok(port) = v.parse() {
                self.broker.clear_port = port;
            }
        }
        if let Ok(v) = std::env::var("IDP_BROKER_CURVE_HOST") {
            self.broker.curve_host = Some(v);
        }
        if let Ok(v) = std::env::var("IDP_BROKER_CURVE_PORT") {
            if let Ok(port) = v.parse() {
                self.broker.curve_port = Some(port);
            }
        }
        if let Ok(v) = std::env::var("IDP_BROKER_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.broker.heartbeat_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("IDP_BROKER_HEARTBEAT_LIVENESS") {
            if let Ok(n) = v.parse() {
                self.broker.heartbeat_liveness = n;
            }
        }
        if let Ok(v) = std::env::var("IDP_CLIENT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.client.timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("IDP_CLIENT_RETRIES") {
            if let Ok(n) = v.parse() {
                self.client.retries = n;
            }
        }
        if let Ok(v) = std::env::var("IDP_WORKER_HEARTBEAT_MS") {
            if let Ok(ms) = v.parse() {
                self.worker.heartbeat_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("IDP_WORKER_RECONNECT_MS") {
            if let Ok(ms) = v.parse() {
                self.worker.reconnect_ms = ms;
            }
        }
    }

    pub fn validate(&self) -> Result<(), IdpError> {
        self.broker.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = IrondomoConfig::default();
        assert_eq!(cfg.broker.heartbeat_interval_ms, HEARTBEAT_INTERVAL_MS);
        assert_eq!(cfg.broker.heartbeat_liveness, HEARTBEAT_LIVENESS);
        assert_eq!(cfg.client.timeout_ms, CLIENT_TIMEOUT_MS);
        assert_eq!(cfg.client.retries, CLIENT_RETRIES);
        assert_eq!(cfg.worker.reconnect_ms, WORKER_RECONNECT_MS);
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg = IrondomoConfig::from_toml(
            r#"
            [broker]
            clear_port = 6000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.broker.clear_port, 6000);
        assert_eq!(cfg.broker.clear_host, "127.0.0.1");
    }

    #[test]
    fn rejects_partial_curve_config() {
        let cfg = IrondomoConfig {
            broker: BrokerConfig {
                curve_host: Some("127.0.0.1".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("IDP_CLIENT_RETRIES", "7");
        let mut cfg = IrondomoConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.client.retries, 7);
        std::env::remove_var("IDP_CLIENT_RETRIES");
    }

    #[test]
    fn heartbeat_expiry_is_interval_times_liveness() {
        let cfg = BrokerConfig::default();
        assert_eq!(
            cfg.heartbeat_expiry(),
            cfg.heartbeat_interval() * cfg.heartbeat_liveness
        );
    }
}
