//! Block rules and their deterministic names.
//!
//! A rule name is the configured prefix followed by the IP's canonical text
//! form, so the firewall can be queried for an IP without consulting the
//! ledger, and a name maps back to exactly one IP.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionDetail;

pub const DEFAULT_RULE_PREFIX: &str = "Block_IP_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNamer {
    prefix: String,
}

impl Default for RuleNamer {
    fn default() -> Self {
        Self::new(DEFAULT_RULE_PREFIX)
    }
}

impl RuleNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn name_for(&self, ip: IpAddr) -> String {
        format!("{}{}", self.prefix, ip)
    }

    /// Inverse of [`RuleNamer::name_for`]. Rejects names whose suffix is not
    /// the canonical form of an IP, so the mapping stays one-to-one.
    pub fn ip_for(&self, name: &str) -> Option<IpAddr> {
        let suffix = name.strip_prefix(&self.prefix)?;
        let ip: IpAddr = suffix.parse().ok()?;
        (ip.to_string() == suffix).then_some(ip)
    }
}

/// One installed outbound block, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub ip: IpAddr,
    pub rule_name: String,
    pub block_string: String,
    pub connection_detail: ConnectionDetail,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl BlockRule {
    pub fn new(
        namer: &RuleNamer,
        ip: IpAddr,
        block_string: impl Into<String>,
        connection_detail: ConnectionDetail,
    ) -> Self {
        Self {
            ip,
            rule_name: namer.name_for(ip),
            block_string: block_string.into(),
            connection_detail,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_to_ip() {
        let namer = RuleNamer::default();
        for raw in ["52.95.110.1", "2600:1f18::1"] {
            let ip: IpAddr = raw.parse().unwrap();
            let name = namer.name_for(ip);
            assert_eq!(name, format!("Block_IP_{raw}"));
            assert_eq!(namer.ip_for(&name), Some(ip));
        }
    }

    #[test]
    fn foreign_or_non_canonical_names_are_rejected() {
        let namer = RuleNamer::default();
        assert_eq!(namer.ip_for("Allow_IP_1.2.3.4"), None);
        assert_eq!(namer.ip_for("Block_IP_not-an-ip"), None);
        assert_eq!(namer.ip_for("Block_IP_2600:1F18:0::1"), None);
    }
}
