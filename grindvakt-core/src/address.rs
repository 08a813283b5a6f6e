use std::net::IpAddr;

/// Remote addresses that can never be legitimate block targets:
/// unspecified, loopback and IPv6 link-local (`fe80::/10`).
///
/// IPv4-mapped IPv6 addresses are judged by their IPv4 form.
pub fn is_excluded_remote(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_unspecified() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_unspecified() || v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(raw: &str) -> bool {
        is_excluded_remote(raw.parse().unwrap())
    }

    #[test]
    fn excludes_local_addresses() {
        for raw in ["0.0.0.0", "127.0.0.1", "::", "::1", "fe80::1", "febf::1", "::ffff:127.0.0.1"] {
            assert!(excluded(raw), "{raw} should be excluded");
        }
    }

    #[test]
    fn keeps_routable_addresses() {
        for raw in ["52.95.110.1", "10.0.0.1", "2600:1f18::1", "fec0::1"] {
            assert!(!excluded(raw), "{raw} should not be excluded");
        }
    }
}
