use thiserror::Error;

/// Errors raised while validating or constructing a [`crate::ClusterConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("listen_port must be greater than zero")]
    InvalidListenPort,
    #[error("min_timeout ({min:?}) must not exceed max_timeout ({max:?})")]
    TimeoutRangeInverted {
        min: std::time::Duration,
        max: std::time::Duration,
    },
    #[error("invalid listen address {host}:{port}: {source}")]
    InvalidListenAddress {
        host: String,
        port: u16,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Errors surfaced at the Transport API boundary.
///
/// Per the transport contract, network failures (connection refused, DNS
/// failure, timeout, non-200 status) never reach this type — they are
/// normalized to `(false, None)` at the Requester. Only programmer errors
/// (an invalid request payload) and server bind failures are real errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request payload must be a JSON object, got: {0}")]
    InvalidPayload(serde_json::Value),
    #[error("failed to bind responder to {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("responder server exited unexpectedly: {0}")]
    ServerError(#[from] std::io::Error),
}

/// Top-level error returned by the Cluster facade.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
