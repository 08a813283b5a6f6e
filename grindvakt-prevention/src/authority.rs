//! ## grindvakt-prevention::authority
//! **Single owner of firewall block state**
//!
//! Every block and unblock goes through [`EnforcementAuthority`]. It keeps the
//! firewall and the ledger in step and makes both operations idempotent:
//!
//! - an IP already being blocked is skipped (`InFlight`) instead of racing a
//!   second `add`,
//! - an existing firewall rule is never re-added,
//! - block and unblock of the same IP are serialized by a per-IP lock.
//!
//! A firewall failure releases the in-flight guard and leaves the ledger
//! untouched, so the next scan tick retries naturally.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use grindvakt_core::{BlockRule, ConnectionDetail, RuleNamer};
use grindvakt_telemetry::EventLogger;
use ipnetwork::IpNetwork;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{EnforcementError, LedgerError};
use crate::firewall::FirewallController;
use crate::ledger::RuleLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Blocked(BlockRule),
    AlreadyBlocked,
    InFlight,
    /// The IP is covered by the configured whitelist.
    Exempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockOutcome {
    Unblocked { ledger_entries_removed: usize },
    NotBlocked,
}

/// Per-IP results of [`EnforcementAuthority::unblock_by_criterion`].
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub unblocked: Vec<IpAddr>,
    pub not_blocked: Vec<IpAddr>,
    pub failures: Vec<(IpAddr, EnforcementError)>,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct EnforcementAuthority {
    firewall: Arc<dyn FirewallController>,
    ledger: Arc<RuleLedger>,
    namer: RuleNamer,
    whitelist: Vec<IpNetwork>,
    in_flight: Mutex<HashSet<IpAddr>>,
    locks: IpLocks,
}

impl EnforcementAuthority {
    pub fn new(
        firewall: Arc<dyn FirewallController>,
        ledger: Arc<RuleLedger>,
        namer: RuleNamer,
        whitelist: Vec<IpNetwork>,
    ) -> Self {
        Self {
            firewall,
            ledger,
            namer,
            whitelist,
            in_flight: Mutex::new(HashSet::new()),
            locks: IpLocks::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<RuleLedger> {
        &self.ledger
    }

    pub fn namer(&self) -> &RuleNamer {
        &self.namer
    }

    pub fn is_in_flight(&self, ip: IpAddr) -> bool {
        self.in_flight.lock().contains(&ip)
    }

    fn is_whitelisted(&self, ip: IpAddr) -> bool {
        self.whitelist.iter().any(|net| net.contains(ip))
    }

    /// Installs an outbound block for `ip`, recording `criterion` and `detail`.
    ///
    /// IPv4-mapped addresses are blocked as their IPv4 form.
    #[instrument(skip(self, detail))]
    pub async fn block(
        &self,
        ip: IpAddr,
        criterion: &str,
        detail: ConnectionDetail,
    ) -> Result<BlockOutcome, EnforcementError> {
        let ip = ip.to_canonical();
        if self.is_whitelisted(ip) {
            debug!("Whitelisted, not blocking");
            return Ok(BlockOutcome::Exempt);
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, ip) else {
            debug!("Block already in flight");
            return Ok(BlockOutcome::InFlight);
        };
        let _ip_lock = self.locks.acquire(ip).await;

        let rule_name = self.namer.name_for(ip);
        if self.firewall.rule_exists(&rule_name).await? {
            return Ok(BlockOutcome::AlreadyBlocked);
        }

        if let Err(e) = self.firewall.add_block_rule(&rule_name, ip).await {
            error!(%rule_name, error = %e, "Firewall rejected block rule");
            EventLogger::log_event(
                "firewall_block_failed",
                vec![
                    KeyValue::new("ip_address", ip.to_string()),
                    KeyValue::new("rule_name", rule_name),
                    KeyValue::new("error", e.to_string()),
                ],
            )
            .await;
            return Err(e.into());
        }

        let rule = BlockRule::new(&self.namer, ip, criterion, detail);
        match self.ledger.record(rule.clone()).await {
            Ok(0) => {}
            Ok(replaced) => {
                warn!(replaced, "Replaced ledger entry whose firewall rule had disappeared");
            }
            Err(e @ LedgerError::Persist { .. }) => {
                warn!(error = %e, "Block installed but ledger write failed");
            }
            Err(e) => return Err(e.into()),
        }

        info!(rule_name = %rule.rule_name, "IP blocked");
        EventLogger::log_event(
            "firewall_block",
            vec![
                KeyValue::new("ip_address", ip.to_string()),
                KeyValue::new("rule_name", rule.rule_name.clone()),
                KeyValue::new("block_string", criterion.to_string()),
                KeyValue::new("process_name", rule.connection_detail.process_name.clone()),
            ],
        )
        .await;
        Ok(BlockOutcome::Blocked(rule))
    }

    /// Removes the block for `ip` and its ledger entries.
    ///
    /// Without an installed firewall rule this is a no-op, ledger included.
    #[instrument(skip(self))]
    pub async fn unblock(&self, ip: IpAddr) -> Result<UnblockOutcome, EnforcementError> {
        let ip = ip.to_canonical();
        let _ip_lock = self.locks.acquire(ip).await;

        let rule_name = self.namer.name_for(ip);
        if !self.firewall.rule_exists(&rule_name).await? {
            debug!(%rule_name, "No firewall rule, nothing to unblock");
            return Ok(UnblockOutcome::NotBlocked);
        }

        if let Err(e) = self.firewall.delete_rule(&rule_name).await {
            error!(%rule_name, error = %e, "Firewall refused rule deletion");
            EventLogger::log_event(
                "firewall_unblock_failed",
                vec![
                    KeyValue::new("ip_address", ip.to_string()),
                    KeyValue::new("rule_name", rule_name),
                    KeyValue::new("error", e.to_string()),
                ],
            )
            .await;
            return Err(e.into());
        }

        let recorded = self
            .ledger
            .rules()
            .await
            .iter()
            .filter(|r| r.rule_name == rule_name)
            .count();
        let removed = match self.ledger.remove_by_rule_name(&rule_name).await {
            Ok(removed) => removed,
            Err(e @ LedgerError::Persist { .. }) => {
                warn!(error = %e, "Block removed but ledger write failed");
                recorded
            }
            Err(e) => return Err(e.into()),
        };
        info!(%rule_name, removed, "IP unblocked");
        EventLogger::log_event(
            "firewall_unblock",
            vec![
                KeyValue::new("ip_address", ip.to_string()),
                KeyValue::new("rule_name", rule_name),
            ],
        )
        .await;
        Ok(UnblockOutcome::Unblocked {
            ledger_entries_removed: removed,
        })
    }

    /// Unblocks every IP recorded under `criterion`, one at a time.
    /// A failure for one IP does not stop the others.
    pub async fn unblock_by_criterion(&self, criterion: &str) -> CascadeReport {
        let mut seen = HashSet::new();
        let ips: Vec<IpAddr> = self
            .ledger
            .rules_for_criterion(criterion)
            .await
            .into_iter()
            .map(|rule| rule.ip)
            .filter(|ip| seen.insert(*ip))
            .collect();

        let mut report = CascadeReport::default();
        for ip in ips {
            match self.unblock(ip).await {
                Ok(UnblockOutcome::Unblocked { .. }) => report.unblocked.push(ip),
                Ok(UnblockOutcome::NotBlocked) => report.not_blocked.push(ip),
                Err(e) => {
                    warn!(%ip, criterion, error = %e, "Cascade unblock failed");
                    report.failures.push((ip, e));
                }
            }
        }
        report
    }
}

/// Membership in the in-flight set, released on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<IpAddr>>,
    ip: IpAddr,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<IpAddr>>, ip: IpAddr) -> Option<Self> {
        set.lock().insert(ip).then_some(Self { set, ip })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.ip);
    }
}

/// Lazily created async mutex per IP; entries are dropped once unused.
#[derive(Default)]
struct IpLocks {
    locks: Mutex<HashMap<IpAddr, Arc<AsyncMutex<()>>>>,
}

impl IpLocks {
    async fn acquire(&self, ip: IpAddr) -> IpLockGuard<'_> {
        let lock = self.locks.lock().entry(ip).or_default().clone();
        let guard = lock.lock_owned().await;
        IpLockGuard {
            owner: self,
            ip,
            guard: Some(guard),
        }
    }
}

struct IpLockGuard<'a> {
    owner: &'a IpLocks,
    ip: IpAddr,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IpLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock();
        if locks
            .get(&self.ip)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.ip);
        }
    }
}
