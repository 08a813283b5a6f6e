//! Reverse DNS port and the system resolver adapter.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::ResolverError;

#[async_trait]
pub trait ReverseDns: Send + Sync {
    /// Hostnames registered for `ip`, most authoritative first. Empty when
    /// the address has no PTR record.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, ResolverError>;
}

/// Blocking reverse lookup of one address.
type LookupFn = fn(&IpAddr) -> io::Result<String>;

/// Reverse lookups through the platform resolver (`getnameinfo`).
///
/// The call itself cannot be cancelled; on timeout the blocking worker is
/// left to finish in the background and the caller moves on.
pub struct SystemDns {
    timeout: Duration,
    lookup: LookupFn,
}

impl SystemDns {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            lookup: dns_lookup::lookup_addr,
        }
    }

    #[cfg(test)]
    fn with_lookup(timeout: Duration, lookup: LookupFn) -> Self {
        Self { timeout, lookup }
    }
}

#[async_trait]
impl ReverseDns for SystemDns {
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, ResolverError> {
        let lookup = self.lookup;
        let task = tokio::task::spawn_blocking(move || lookup(&ip));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_elapsed) => Err(ResolverError::DnsTimeout(self.timeout)),
            Ok(Err(join)) => Err(ResolverError::Dns(join.to_string())),
            Ok(Ok(Err(e))) => Err(ResolverError::Dns(e.to_string())),
            Ok(Ok(Ok(hostname))) => Ok(hostnames_from(ip, hostname)),
        }
    }
}

/// getnameinfo falls back to the numeric form when no PTR record exists.
fn hostnames_from(ip: IpAddr, hostname: String) -> Vec<String> {
    if hostname.is_empty() || hostname.parse::<IpAddr>().ok() == Some(ip) {
        Vec::new()
    } else {
        vec![hostname]
    }
}
