use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use grindvakt_core::command::run_command;
use grindvakt_core::RuleNamer;
use tracing::debug;

use super::FirewallController;
use crate::error::FirewallError;

const CHAIN: &str = "OUTPUT";

/// Linux netfilter through `iptables` / `ip6tables`.
///
/// Rules are `OUTPUT -d <ip> -j DROP` tagged with a comment holding the rule
/// name. The IP is recovered from the name, which is why the adapter carries
/// the [`RuleNamer`].
#[derive(Debug, Clone)]
pub struct IptablesFirewall {
    namer: RuleNamer,
    timeout: Duration,
}

impl IptablesFirewall {
    pub fn new(namer: RuleNamer, timeout: Duration) -> Self {
        Self { namer, timeout }
    }

    fn ip_of(&self, rule_name: &str) -> Result<IpAddr, FirewallError> {
        self.namer
            .ip_for(rule_name)
            .ok_or_else(|| FirewallError::ForeignRuleName(rule_name.to_string()))
    }
}

fn program_for(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "iptables",
        IpAddr::V6(_) => "ip6tables",
    }
}

fn rule_args(action: &str, rule_name: &str, ip: IpAddr) -> Vec<String> {
    vec![
        action.into(),
        CHAIN.into(),
        "-d".into(),
        ip.to_string(),
        "-m".into(),
        "comment".into(),
        "--comment".into(),
        rule_name.into(),
        "-j".into(),
        "DROP".into(),
    ]
}

#[async_trait]
impl FirewallController for IptablesFirewall {
    async fn rule_exists(&self, rule_name: &str) -> Result<bool, FirewallError> {
        let ip = self.ip_of(rule_name)?;
        let program = program_for(ip);
        let output = run_command(program, &rule_args("-C", rule_name, ip), self.timeout).await?;
        match output.status {
            Some(0) => Ok(true),
            // iptables answers "no such rule" with status 1
            Some(1) => Ok(false),
            other => Err(FirewallError::UnexpectedResponse(format!(
                "{program} -C exited with {other:?}: {}",
                output.stderr.trim()
            ))),
        }
    }

    async fn add_block_rule(&self, rule_name: &str, ip: IpAddr) -> Result<(), FirewallError> {
        let program = program_for(ip);
        run_command(program, &rule_args("-A", rule_name, ip), self.timeout)
            .await?
            .into_success(program)?;
        debug!(rule_name, %ip, "iptables rule appended");
        Ok(())
    }

    async fn delete_rule(&self, rule_name: &str) -> Result<(), FirewallError> {
        let ip = self.ip_of(rule_name)?;
        let program = program_for(ip);
        // -D removes one match per call; duplicates are drained until -C says none remain
        loop {
            run_command(program, &rule_args("-D", rule_name, ip), self.timeout)
                .await?
                .into_success(program)?;
            if !self.rule_exists(rule_name).await? {
                break;
            }
        }
        debug!(rule_name, "iptables rule deleted");
        Ok(())
    }
}
