//! Scan loop configuration.
//!
//! Controls how often connections are enumerated, which processes are of
//! interest, and how many per-connection pipelines may run at once.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ScanConfig {
    /// Interval between scan ticks (milliseconds).
    #[validate(range(min = 500, max = 60_000))]
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Case-insensitive substring a process image name must contain to be enforced.
    #[validate(length(min = 1))]
    #[serde(default = "default_target_process")]
    pub target_process: String,

    /// Upper bound on concurrently running connection pipelines per tick.
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_pipelines: usize,

    /// Timeout for the connection listing utility (milliseconds).
    #[validate(range(min = 100, max = 60_000))]
    #[serde(default = "default_list_timeout_ms")]
    pub list_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}
fn default_target_process() -> String {
    "cursor".into()
}
fn default_max_concurrent() -> usize {
    (num_cpus::get() * 4).clamp(1, 1024)
}
fn default_list_timeout_ms() -> u64 {
    5000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            target_process: default_target_process(),
            max_concurrent_pipelines: default_max_concurrent(),
            list_timeout_ms: default_list_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_rejected() {
        let mut config = ScanConfig::default();
        config.target_process.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ScanConfig {
            max_concurrent_pipelines: 0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
