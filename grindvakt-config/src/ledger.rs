use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Persisted rule ledger parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct LedgerConfig {
    /// JSON store holding `blockRules` and `blockingStrings`.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Blocking criteria written when the store does not exist yet.
    #[validate(custom(function = validation::validate_criteria))]
    #[serde(default = "default_seed_criteria")]
    pub seed_criteria: Vec<String>,

    /// Extra attempts for a failed store write.
    #[validate(range(max = 10))]
    #[serde(default = "default_write_retries")]
    pub write_retries: usize,

    /// Delay between write attempts (milliseconds).
    #[validate(range(max = 10_000))]
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("db/db.json")
}
fn default_seed_criteria() -> Vec<String> {
    vec!["s3".into(), "aws.amazon.com".into()]
}
fn default_write_retries() -> usize {
    3
}
fn default_retry_backoff() -> u64 {
    100
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            seed_criteria: default_seed_criteria(),
            write_retries: default_write_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}
