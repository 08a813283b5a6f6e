//! Custom validation functions shared by the configuration sections.

use std::net::SocketAddr;

use ipnetwork::IpNetwork;
use validator::ValidationError;

/// Whitelists must not contain catch-all ranges; they would disable enforcement entirely.
pub fn validate_whitelist(cidrs: &[IpNetwork]) -> Result<(), ValidationError> {
    if cidrs.iter().any(|n| n.prefix() == 0) {
        return Err(ValidationError::new("catch_all_whitelist"));
    }
    Ok(())
}

/// Firewall rule prefixes end up inside shell-free argument lists, but they
/// still have to be accepted by both `netsh` and `iptables --comment`.
pub fn validate_rule_prefix(prefix: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[A-Za-z0-9_]{1,32}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(prefix) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_rule_prefix"))
    }
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// The control channel accepts unauthenticated commands, so it never leaves the host.
pub fn validate_loopback(addr: &SocketAddr) -> Result<(), ValidationError> {
    if addr.ip().is_loopback() {
        Ok(())
    } else {
        Err(ValidationError::new("control_not_loopback"))
    }
}

/// Blocking criteria must be non-empty and unique.
pub fn validate_criteria(criteria: &[String]) -> Result<(), ValidationError> {
    if criteria.iter().any(|c| c.is_empty()) {
        return Err(ValidationError::new("empty_criterion"));
    }
    let mut seen = std::collections::HashSet::new();
    if !criteria.iter().all(|c| seen.insert(c.as_str())) {
        return Err(ValidationError::new("duplicate_criterion"));
    }
    Ok(())
}
