//! `/proc/net/tcp{,6}` connection listing (Linux).
//!
//! Socket ownership is recovered by walking `/proc/<pid>/fd` and matching
//! `socket:[inode]` links against the inode column of the socket tables.
//! File descriptors of other users are unreadable without privileges; such
//! sockets are reported with PID 0.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grindvakt_core::{Connection, Endpoint, Protocol};
use tracing::{debug, instrument};

use crate::{CaptureError, ConnectionSource};

const TABLES: [(&str, bool); 2] = [("net/tcp", true), ("net/tcp6", false)];

pub struct ProcNetSource {
    root: PathBuf,
}

impl Default for ProcNetSource {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcNetSource {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ConnectionSource for ProcNetSource {
    #[instrument(level = "debug", skip(self))]
    async fn tcp_connections(&self) -> Result<Vec<Connection>, CaptureError> {
        let root = self.root.clone();
        let connections = tokio::task::spawn_blocking(move || scan(&root)).await??;
        debug!(count = connections.len(), "Listed TCP connections");
        Ok(connections)
    }
}

fn scan(root: &Path) -> Result<Vec<Connection>, CaptureError> {
    let owners = socket_owners(root);
    let mut connections = Vec::new();

    for (table, required) in TABLES {
        let path = root.join(table);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => continue,
            Err(source) => return Err(CaptureError::Io { path, source }),
        };

        for line in content.lines().skip(1) {
            if let Some((mut conn, inode)) = parse_table_line(line) {
                conn.pid = owners.get(&inode).copied().unwrap_or(0);
                connections.push(conn);
            }
        }
    }
    Ok(connections)
}

/// Maps socket inodes to the PID holding them. Best effort.
fn socket_owners(root: &Path) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(entries) = fs::read_dir(root) else {
        return owners;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Some(inode) = fs::read_link(fd.path())
                .ok()
                .and_then(|link| socket_inode(&link.to_string_lossy()))
            {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    owners
}

fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

fn parse_table_line(line: &str) -> Option<(Connection, u64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 {
        return None;
    }

    let conn = Connection {
        protocol: Protocol::Tcp,
        local: parse_hex_endpoint(parts[1])?,
        remote: parse_hex_endpoint(parts[2])?,
        pid: 0,
        state: tcp_state(parts[3]).to_string(),
    };
    Some((conn, parts[9].parse().ok()?))
}

/// Addresses are printed as host-order 32-bit words, so the original bytes
/// are the native-endian bytes of each parsed word.
fn parse_hex_endpoint(s: &str) -> Option<Endpoint> {
    let (hex_addr, hex_port) = s.split_once(':')?;
    let port = u16::from_str_radix(hex_port, 16).ok()?;

    let address = match hex_addr.len() {
        8 => {
            let word = u32::from_str_radix(hex_addr, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for i in 0..4 {
                let word = u32::from_str_radix(&hex_addr[i * 8..(i + 1) * 8], 16).ok()?;
                octets[i * 4..(i + 1) * 4].copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(Endpoint::new(address, port))
}

fn tcp_state(code: &str) -> &'static str {
    match code {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}

#[cfg(all(test, unix, target_endian = "little"))]
mod tests {
    use super::*;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 1111 1 0000000000000000 100 0 0 10 0
   1: 0500000A:C3CB 016E5F34:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 5555 1 0000000000000000 20 4 30 10 -1
";

    const TCP6: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000001000000:0050 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 2222 1 0000000000000000 100 0 0 10 0
   1: 0000000000000000FFFF00000500000A:C3CC 0000000000000000FFFF0000016E5F34:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 6666 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn parses_v4_rows() {
        let (conn, inode) = parse_table_line(TCP.lines().nth(2).unwrap()).unwrap();
        assert_eq!(conn.local.to_string(), "10.0.0.5:50123");
        assert_eq!(conn.remote.to_string(), "52.95.110.1:443");
        assert_eq!(conn.state, "ESTABLISHED");
        assert_eq!(inode, 5555);
    }

    #[test]
    fn parses_v6_rows() {
        let (conn, _) = parse_table_line(TCP6.lines().nth(1).unwrap()).unwrap();
        assert_eq!(conn.local.address, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(conn.state, "LISTEN");
    }

    #[test]
    fn dual_stack_rows_report_plain_v4_peers() {
        let (conn, inode) = parse_table_line(TCP6.lines().nth(2).unwrap()).unwrap();
        assert_eq!(conn.remote.address, "52.95.110.1".parse::<IpAddr>().unwrap());
        assert!(conn.remote.address.is_ipv4());
        assert_eq!(conn.local.to_string(), "10.0.0.5:50124");
        assert_eq!(inode, 6666);
    }

    #[tokio::test]
    async fn resolves_socket_owners_from_fd_links() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(root.path().join("net/tcp"), TCP).unwrap();
        fs::write(root.path().join("net/tcp6"), TCP6).unwrap();
        fs::create_dir_all(root.path().join("4242/fd")).unwrap();
        std::os::unix::fs::symlink("socket:[5555]", root.path().join("4242/fd/7")).unwrap();

        let source = ProcNetSource::with_root(root.path());
        let conns = source.tcp_connections().await.unwrap();

        assert_eq!(conns.len(), 4);
        let owned: Vec<_> = conns.iter().filter(|c| c.pid == 4242).collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].remote.port, 443);
    }

    #[tokio::test]
    async fn missing_v4_table_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let source = ProcNetSource::with_root(root.path());
        assert!(matches!(
            source.tcp_connections().await,
            Err(CaptureError::Io { .. })
        ));
    }
}
