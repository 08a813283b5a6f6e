//! In-memory firewall for tests of the enforcement path.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use grindvakt_core::CommandError;
use parking_lot::Mutex;

use crate::error::FirewallError;
use crate::firewall::FirewallController;

#[derive(Default)]
pub struct FakeFirewall {
    rules: Mutex<HashMap<String, IpAddr>>,
    add_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    fail_add: AtomicBool,
    fail_exists: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    add_delay: Mutex<Duration>,
}

impl FakeFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(self, rule_name: &str, ip: IpAddr) -> Self {
        self.rules.lock().insert(rule_name.to_string(), ip);
        self
    }

    pub fn installed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops a rule without going through [`FirewallController::delete_rule`].
    pub fn remove_rule(&self, rule_name: &str) {
        self.rules.lock().remove(rule_name);
    }

    pub fn has_rule(&self, rule_name: &str) -> bool {
        self.rules.lock().contains_key(rule_name)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn fail_adds(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    pub fn fail_existence_checks(&self, fail: bool) {
        self.fail_exists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, rule_name: &str) {
        self.failing_deletes.lock().insert(rule_name.to_string());
    }

    /// Makes every add suspend for `delay` before taking effect.
    pub fn delay_adds(&self, delay: Duration) {
        *self.add_delay.lock() = delay;
    }

    fn injected(op: &str) -> FirewallError {
        FirewallError::Command(CommandError::Failed {
            program: "fake-firewall".into(),
            status: Some(1),
            stderr: format!("injected {op} failure"),
        })
    }
}

#[async_trait]
impl FirewallController for FakeFirewall {
    async fn rule_exists(&self, rule_name: &str) -> Result<bool, FirewallError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(Self::injected("exists"));
        }
        Ok(self.rules.lock().contains_key(rule_name))
    }

    async fn add_block_rule(&self, rule_name: &str, ip: IpAddr) -> Result<(), FirewallError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.add_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(Self::injected("add"));
        }
        self.rules.lock().insert(rule_name.to_string(), ip);
        Ok(())
    }

    async fn delete_rule(&self, rule_name: &str) -> Result<(), FirewallError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().contains(rule_name) {
            return Err(Self::injected("delete"));
        }
        self.rules.lock().remove(rule_name);
        Ok(())
    }
}
