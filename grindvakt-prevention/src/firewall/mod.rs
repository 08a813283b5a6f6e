//! Host firewall control.
//!
//! A rule is fully identified by its name, and names are derived from the
//! blocked IP by [`grindvakt_core::RuleNamer`]. Adapters never keep their own
//! bookkeeping; the firewall itself is the source of truth for existence.

mod iptables;
mod netsh;

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::FirewallError;

pub use iptables::IptablesFirewall;
pub use netsh::NetshFirewall;

#[async_trait]
pub trait FirewallController: Send + Sync {
    /// Whether a rule with exactly this name is installed.
    async fn rule_exists(&self, rule_name: &str) -> Result<bool, FirewallError>;

    /// Installs an outbound block of `ip` under `rule_name`.
    async fn add_block_rule(&self, rule_name: &str, ip: IpAddr) -> Result<(), FirewallError>;

    /// Removes every rule carrying `rule_name`.
    async fn delete_rule(&self, rule_name: &str) -> Result<(), FirewallError>;
}
