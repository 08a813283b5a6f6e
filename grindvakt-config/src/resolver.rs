//! Remote identity resolution configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ResolverConfig {
    /// Reverse DNS timeout (milliseconds).
    #[validate(range(min = 100, max = 30_000))]
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout_ms: u64,

    /// Published provider IP-range dataset (AWS `ip-ranges.json` format).
    #[serde(default = "default_ip_ranges_path")]
    pub ip_ranges_path: PathBuf,

    /// Label substituted for addresses inside the provider's ranges.
    #[validate(length(min = 1))]
    #[serde(default = "default_provider_label")]
    pub provider_label: String,
}

fn default_dns_timeout() -> u64 {
    2000
}
fn default_ip_ranges_path() -> PathBuf {
    PathBuf::from("db/ip-ranges.json")
}
fn default_provider_label() -> String {
    "aws.amazon.com".into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: default_dns_timeout(),
            ip_ranges_path: default_ip_ranges_path(),
            provider_label: default_provider_label(),
        }
    }
}
