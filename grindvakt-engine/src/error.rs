use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use grindvakt_capture::CaptureError;
use grindvakt_detection::DecisionError;
use grindvakt_prevention::{EnforcementError, LedgerError};
use grindvakt_resolver::ResolverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection listing failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Connection listing timed out after {0:?}")]
    ListTimeout(Duration),

    #[error("Remote resolution failed: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Criteria could not be compiled: {0}")]
    Decision(#[from] DecisionError),

    #[error("Enforcement failed: {0}")]
    Enforcement(#[from] EnforcementError),

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Cannot listen for operator commands on {addr}: {source}")]
    ControlBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Structured failures returned to the operator by the control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Enforcement failed: {0}")]
    Enforcement(#[from] EnforcementError),

    #[error("Storage error: {0}")]
    Storage(#[from] LedgerError),

    #[error("Metrics unavailable: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failures talking to a running daemon over the control channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("No daemon is listening on {addr}")]
    Unavailable {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Control channel I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Control request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed control message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Daemon closed the connection without replying")]
    Closed,
}
