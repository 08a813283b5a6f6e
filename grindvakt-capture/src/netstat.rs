//! `netstat -ano` connection listing (Windows).

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use grindvakt_core::command::run_command;
use grindvakt_core::{Connection, Endpoint, Protocol};
use tracing::{debug, instrument};

use crate::{CaptureError, ConnectionSource};

pub struct NetstatSource {
    timeout: Duration,
}

impl NetstatSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectionSource for NetstatSource {
    #[instrument(level = "debug", skip(self))]
    async fn tcp_connections(&self) -> Result<Vec<Connection>, CaptureError> {
        let output = run_command("netstat", &["-ano"], self.timeout)
            .await?
            .into_success("netstat")?;
        let connections = parse_netstat(&output.stdout);
        debug!(count = connections.len(), "Listed TCP connections");
        Ok(connections)
    }
}

/// Extracts TCP rows from `netstat -ano` output; headers and UDP rows are skipped.
pub fn parse_netstat(stdout: &str) -> Vec<Connection> {
    stdout.lines().filter_map(parse_netstat_line).collect()
}

fn parse_netstat_line(line: &str) -> Option<Connection> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 5 || !parts[0].eq_ignore_ascii_case("tcp") {
        return None;
    }

    Some(Connection {
        protocol: Protocol::Tcp,
        local: split_addr_port(parts[1])?,
        remote: split_addr_port(parts[2])?,
        state: parts[3].to_string(),
        pid: parts[4].parse().ok()?,
    })
}

/// Parses `1.2.3.4:443`, `[::1]:443` and `[fe80::1%12]:445`.
fn split_addr_port(s: &str) -> Option<Endpoint> {
    let (host, port) = s.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.split('%').next().unwrap_or(host);
    let address: IpAddr = host.parse().ok()?;
    Some(Endpoint::new(address, port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1000
  TCP    10.0.0.5:50123         52.95.110.1:443        ESTABLISHED     4242
  TCP    [::1]:8080             [::]:0                 LISTENING       77
  TCP    [fe80::1%12]:49670     [fe80::2%12]:445       TIME_WAIT       0
  UDP    0.0.0.0:5353           *:*                                    2211
";

    #[test]
    fn parses_v4_and_v6_rows() {
        let conns = parse_netstat(SAMPLE);
        assert_eq!(conns.len(), 4);

        let established = &conns[1];
        assert_eq!(established.pid, 4242);
        assert_eq!(established.state, "ESTABLISHED");
        assert_eq!(established.remote.to_string(), "52.95.110.1:443");

        let scoped = &conns[3];
        assert_eq!(scoped.remote.address, "fe80::2".parse::<IpAddr>().unwrap());
        assert_eq!(scoped.pid, 0);
    }

    #[test]
    fn skips_udp_and_headers() {
        assert!(parse_netstat("  UDP    0.0.0.0:5353   *:*     2211").is_empty());
        assert!(parse_netstat("  Proto  Local Address  Foreign Address  State  PID").is_empty());
    }
}
