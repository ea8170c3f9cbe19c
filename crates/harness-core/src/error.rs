use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("rate limiter wait canceled")]
    RateLimiterCanceled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("server unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server exited before signalling readiness")]
    ServerNotReady,

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
