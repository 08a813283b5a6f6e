//! ## grindvakt-prevention::ledger
//! **Durable record of installed block rules and blocking criteria**
//!
//! The store is a single JSON document:
//!
//! ```json
//! { "blockRules": [ ... ], "blockingStrings": ["s3", "aws.amazon.com"] }
//! ```
//!
//! The store holds at most one entry per rule name. All mutations are
//! serialized behind one async mutex and written through
//! to disk (temp file, then rename) before the lock is released, so readers
//! never observe a half-written document. When a write keeps failing the
//! in-memory change is kept and [`LedgerError::Persist`] is returned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use grindvakt_core::BlockRule;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::LedgerError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    #[serde(default)]
    pub block_rules: Vec<BlockRule>,
    #[serde(default)]
    pub blocking_strings: Vec<String>,
}

/// Write retry schedule: `max_retries` extra attempts, doubling the delay each time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: usize) -> Duration {
        self.initial_backoff
            .saturating_mul(1u32 << attempt.min(16) as u32)
    }
}

pub struct RuleLedger {
    /// `None` keeps the ledger purely in memory.
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
    retry: RetryPolicy,
}

impl RuleLedger {
    /// Opens the store at `path`, creating it with `seed_criteria` when absent.
    ///
    /// An existing but unparsable store is an error; it is never overwritten.
    pub async fn open(
        path: impl Into<PathBuf>,
        seed_criteria: &[String],
        retry: RetryPolicy,
    ) -> Result<Self, LedgerError> {
        let path = path.into();
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => Some(serde_json::from_str::<LedgerState>(&raw).map_err(|source| {
                LedgerError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(LedgerError::Read { path, source }),
        };

        let ledger = match existing {
            Some(state) => {
                info!(
                    path = %path.display(),
                    rules = state.block_rules.len(),
                    criteria = state.blocking_strings.len(),
                    "Ledger loaded"
                );
                Self {
                    path: Some(path),
                    state: Mutex::new(state),
                    retry,
                }
            }
            None => {
                let state = LedgerState {
                    block_rules: Vec::new(),
                    blocking_strings: seed_criteria.to_vec(),
                };
                let ledger = Self {
                    path: Some(path),
                    state: Mutex::new(state.clone()),
                    retry,
                };
                ledger.persist(&state).await?;
                info!("Ledger initialized with default criteria");
                ledger
            }
        };
        Ok(ledger)
    }

    pub fn in_memory(state: LedgerState) -> Self {
        Self {
            path: None,
            state: Mutex::new(state),
            retry: RetryPolicy::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    pub async fn rules(&self) -> Vec<BlockRule> {
        self.state.lock().await.block_rules.clone()
    }

    pub async fn criteria(&self) -> Vec<String> {
        self.state.lock().await.blocking_strings.clone()
    }

    pub async fn find_by_rule_name(&self, rule_name: &str) -> Option<BlockRule> {
        self.state
            .lock()
            .await
            .block_rules
            .iter()
            .find(|r| r.rule_name == rule_name)
            .cloned()
    }

    pub async fn rules_for_criterion(&self, criterion: &str) -> Vec<BlockRule> {
        self.state
            .lock()
            .await
            .block_rules
            .iter()
            .filter(|r| r.block_string == criterion)
            .cloned()
            .collect()
    }

    /// Records `rule` in place of any entry with the same name, returning how
    /// many stale entries it replaced.
    pub async fn record(&self, rule: BlockRule) -> Result<usize, LedgerError> {
        self.mutate(|state| {
            let before = state.block_rules.len();
            state.block_rules.retain(|r| r.rule_name != rule.rule_name);
            let replaced = before - state.block_rules.len();
            state.block_rules.push(rule);
            Always(replaced)
        })
        .await
        .map(|Always(replaced)| replaced)
    }

    /// Drops every entry named `rule_name`, returning how many were removed.
    pub async fn remove_by_rule_name(&self, rule_name: &str) -> Result<usize, LedgerError> {
        self.mutate(|state| {
            let before = state.block_rules.len();
            state.block_rules.retain(|r| r.rule_name != rule_name);
            before - state.block_rules.len()
        })
        .await
    }

    /// Adds a criterion at the end of the list. `false` when already present.
    pub async fn add_criterion(&self, criterion: &str) -> Result<bool, LedgerError> {
        self.mutate(|state| {
            if state.blocking_strings.iter().any(|c| c == criterion) {
                return false;
            }
            state.blocking_strings.push(criterion.to_string());
            true
        })
        .await
    }

    /// `false` when the criterion was not present.
    pub async fn remove_criterion(&self, criterion: &str) -> Result<bool, LedgerError> {
        self.mutate(|state| {
            let before = state.blocking_strings.len();
            state.blocking_strings.retain(|c| c != criterion);
            before != state.blocking_strings.len()
        })
        .await
    }

    /// Applies `change` and writes the result through. Results that convert to
    /// "nothing changed" (`false` / `0`) skip the write.
    async fn mutate<R, F>(&self, change: F) -> Result<R, LedgerError>
    where
        R: Changed,
        F: FnOnce(&mut LedgerState) -> R,
    {
        let mut state = self.state.lock().await;
        let result = change(&mut state);
        if result.changed() {
            self.persist(&state).await?;
        }
        Ok(result)
    }

    async fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(state).map_err(|e| LedgerError::Persist {
            path: path.to_path_buf(),
            attempts: 0,
            reason: e.to_string(),
        })?;

        let mut last_error = String::new();
        for attempt in 0..=self.retry.max_retries {
            match write_atomically(path, &body).await {
                Ok(()) => {
                    debug!(path = %path.display(), attempt, "Ledger persisted");
                    return Ok(());
                }
                Err(e) => {
                    warn!(path = %path.display(), attempt, error = %e, "Ledger write failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.retry.max_retries {
                tokio::time::sleep(self.retry.backoff_for(attempt)).await;
            }
        }

        Err(LedgerError::Persist {
            path: path.to_path_buf(),
            attempts: self.retry.max_retries + 1,
            reason: last_error,
        })
    }
}

trait Changed {
    fn changed(&self) -> bool;
}

impl Changed for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl Changed for usize {
    fn changed(&self) -> bool {
        *self > 0
    }
}

struct Always<T>(T);

impl<T> Changed for Always<T> {
    fn changed(&self) -> bool {
        true
    }
}

async fn write_atomically(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await
}
