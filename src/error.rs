use thiserror::Error;

/// Errors that can occur in the Irondomo messaging layer.
#[derive(Debug, Error)]
pub enum IdpError {
    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("send failed after {retries} retries")]
    SendFailed { retries: u32 },

    #[error("interrupted")]
    Interrupted,

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
