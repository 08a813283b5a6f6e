use std::path::PathBuf;

use grindvakt_core::CommandError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Rule name {0:?} does not encode a blockable IP")]
    ForeignRuleName(String),

    #[error("Unexpected firewall response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Cannot read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt ledger {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory ledger was updated but could not be written to disk.
    #[error("Ledger change not persisted to {path} after {attempts} attempts: {reason}")]
    Persist {
        path: PathBuf,
        attempts: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Firewall operation failed: {0}")]
    Firewall(#[from] FirewallError),

    #[error("Ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),
}
