//! Prevention system configuration.
//!
//! Parameters for host firewall enforcement:
//! - Firewall backend selection
//! - Deterministic rule naming
//! - Addresses that must never be blocked

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Host firewall control utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallBackend {
    /// Windows Defender Firewall via `netsh advfirewall`.
    Netsh,
    /// Linux netfilter via `iptables`/`ip6tables`.
    Iptables,
}

impl Default for FirewallBackend {
    fn default() -> Self {
        if cfg!(windows) {
            FirewallBackend::Netsh
        } else {
            FirewallBackend::Iptables
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PreventionConfig {
    #[serde(default)]
    pub backend: FirewallBackend,

    /// Timeout for a single firewall command (milliseconds).
    #[validate(range(min = 100, max = 60_000))]
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Prefix of every rule name; the IP is appended verbatim.
    #[validate(custom(function = validation::validate_rule_prefix))]
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,

    /// IP ranges that are never blocked, whatever they resolve to.
    #[validate(custom(function = validation::validate_whitelist))]
    #[serde(default)]
    pub whitelist: Vec<IpNetwork>,
}

fn default_command_timeout() -> u64 {
    5000
}
fn default_rule_prefix() -> String {
    grindvakt_core::DEFAULT_RULE_PREFIX.into()
}

impl Default for PreventionConfig {
    fn default() -> Self {
        Self {
            backend: FirewallBackend::default(),
            command_timeout_ms: default_command_timeout(),
            rule_prefix: default_rule_prefix(),
            whitelist: Vec::new(),
        }
    }
}
