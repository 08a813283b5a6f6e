use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use grindvakt_core::command::run_command;
use tracing::debug;

use super::FirewallController;
use crate::error::FirewallError;

const NETSH: &str = "netsh";

/// Windows Defender Firewall through `netsh advfirewall firewall`.
#[derive(Debug, Clone)]
pub struct NetshFirewall {
    timeout: Duration,
}

impl NetshFirewall {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn show_args(rule_name: &str) -> Vec<String> {
    vec![
        "advfirewall".into(),
        "firewall".into(),
        "show".into(),
        "rule".into(),
        format!("name={rule_name}"),
    ]
}

fn add_args(rule_name: &str, ip: IpAddr) -> Vec<String> {
    vec![
        "advfirewall".into(),
        "firewall".into(),
        "add".into(),
        "rule".into(),
        format!("name={rule_name}"),
        "dir=out".into(),
        "action=block".into(),
        format!("remoteip={ip}"),
    ]
}

fn delete_args(rule_name: &str) -> Vec<String> {
    vec![
        "advfirewall".into(),
        "firewall".into(),
        "delete".into(),
        "rule".into(),
        format!("name={rule_name}"),
    ]
}

/// `netsh ... show rule` exits non-zero and prints "No rules match" when
/// nothing carries the name.
fn parse_show_output(success: bool, stdout: &str) -> Option<bool> {
    if stdout.contains("No rules match") {
        return Some(false);
    }
    if success && stdout.contains("Rule Name:") {
        return Some(true);
    }
    None
}

#[async_trait]
impl FirewallController for NetshFirewall {
    async fn rule_exists(&self, rule_name: &str) -> Result<bool, FirewallError> {
        let output = run_command(NETSH, &show_args(rule_name), self.timeout).await?;
        parse_show_output(output.success, &output.stdout).ok_or_else(|| {
            FirewallError::UnexpectedResponse(format!(
                "show rule {rule_name}: status {:?}: {}",
                output.status,
                output.stderr.trim()
            ))
        })
    }

    async fn add_block_rule(&self, rule_name: &str, ip: IpAddr) -> Result<(), FirewallError> {
        run_command(NETSH, &add_args(rule_name, ip), self.timeout)
            .await?
            .into_success(NETSH)?;
        debug!(rule_name, %ip, "netsh rule added");
        Ok(())
    }

    async fn delete_rule(&self, rule_name: &str) -> Result<(), FirewallError> {
        run_command(NETSH, &delete_args(rule_name), self.timeout)
            .await?
            .into_success(NETSH)?;
        debug!(rule_name, "netsh rule deleted");
        Ok(())
    }
}
