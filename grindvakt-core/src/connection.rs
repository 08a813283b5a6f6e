//! Connection records produced by each scan tick.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are stored as plain IPv4.
    #[inline]
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address: address.to_canonical(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(v4) => write!(f, "{v4}:{}", self.port),
            IpAddr::V6(v6) => write!(f, "[{v6}]:{}", self.port),
        }
    }
}

/// A single socket as observed on the host. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub protocol: Protocol,
    pub local: Endpoint,
    pub remote: Endpoint,
    /// Owning process id, `0` when the OS did not report one.
    pub pid: u32,
    /// OS-reported state string (`ESTABLISHED`, `TIME_WAIT`, ...).
    pub state: String,
}

/// A connection whose remote endpoint carries a human-meaningful label.
///
/// The label lives beside the untouched [`Connection`], so the raw remote IP
/// needed for enforcement is always available through [`ResolvedConnection::ip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub connection: Connection,
    pub label: String,
}

impl ResolvedConnection {
    pub fn new(connection: Connection, label: impl Into<String>) -> Self {
        Self {
            connection,
            label: label.into(),
        }
    }

    /// The original remote IP, regardless of what the label says.
    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.connection.remote.address.to_canonical()
    }

    /// Snapshot stored in the ledger alongside a block rule.
    pub fn detail(&self, process_name: &str) -> ConnectionDetail {
        ConnectionDetail {
            protocol: self.connection.protocol,
            local_address: self.connection.local.address,
            local_port: self.connection.local.port,
            remote_ip: self.ip(),
            remote_label: self.label.clone(),
            remote_port: self.connection.remote.port,
            pid: self.connection.pid,
            process_name: process_name.to_string(),
            state: self.connection.state.clone(),
        }
    }
}

/// Serialized snapshot of the connection that triggered a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    pub protocol: Protocol,
    pub local_address: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_label: String,
    pub remote_port: u16,
    pub pid: u32,
    pub process_name: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Connection {
        Connection {
            protocol: Protocol::Tcp,
            local: Endpoint::new("10.0.0.5".parse().unwrap(), 50123),
            remote: Endpoint::new("52.95.110.1".parse().unwrap(), 443),
            pid: 4242,
            state: "ESTABLISHED".into(),
        }
    }

    #[test]
    fn label_never_replaces_ip() {
        let resolved = ResolvedConnection::new(sample(), "aws.amazon.com");
        assert_eq!(resolved.ip(), "52.95.110.1".parse::<IpAddr>().unwrap());
        assert_eq!(resolved.label, "aws.amazon.com");
    }

    #[test]
    fn detail_uses_camel_case() {
        let detail = ResolvedConnection::new(sample(), "aws.amazon.com").detail("Cursor.exe");
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["remoteIp"], "52.95.110.1");
        assert_eq!(json["remoteLabel"], "aws.amazon.com");
        assert_eq!(json["processName"], "Cursor.exe");
        assert_eq!(json["protocol"], "tcp");
    }

    #[test]
    fn mapped_v4_addresses_are_canonical() {
        let ep = Endpoint::new("::ffff:52.95.110.1".parse().unwrap(), 443);
        assert_eq!(ep.address, "52.95.110.1".parse::<IpAddr>().unwrap());
        assert_eq!(ep.to_string(), "52.95.110.1:443");

        let mut conn = sample();
        conn.remote.address = "::ffff:52.95.110.1".parse().unwrap();
        let resolved = ResolvedConnection::new(conn, "aws.amazon.com");
        assert_eq!(resolved.ip(), "52.95.110.1".parse::<IpAddr>().unwrap());
        assert_eq!(
            resolved.detail("Cursor.exe").remote_ip,
            "52.95.110.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn v6_endpoint_display_is_bracketed() {
        let ep = Endpoint::new("2600:1f18::1".parse().unwrap(), 443);
        assert_eq!(ep.to_string(), "[2600:1f18::1]:443");
    }
}
