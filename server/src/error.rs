//! Error types surfaced by the server API

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid hook direction '{0}', expected 'send' or 'receive'")]
    InvalidHookDirection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
