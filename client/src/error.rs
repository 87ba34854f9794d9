//! Error taxonomy for the client core

use crate::session::SessionPhase;
use shared::ProtocolError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached. Fatal.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A send failed or the connection was already broken.
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawnFailed {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// A worker thread panicked; the concurrency invariants no longer hold.
    #[error("{0} thread panicked")]
    ThreadJoinFailed(&'static str),

    /// Recoverable: only the affected peer is dropped.
    #[error("peer {addr}: {source}")]
    PeerSocket {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error("terminal error: {0}")]
    Terminal(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
