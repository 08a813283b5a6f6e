//! Operator-facing operations on rules and criteria.
//!
//! This is the only writer of blocking criteria. Rule removals are delegated
//! to the [`EnforcementAuthority`] so the firewall and the ledger stay in step.

use std::sync::Arc;

use grindvakt_core::BlockRule;
use grindvakt_prevention::{CascadeReport, EnforcementAuthority, RuleLedger, UnblockOutcome};
use grindvakt_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use tracing::{info, instrument};

use crate::error::ControlError;

/// Ledger totals plus the daemon's metrics in Prometheus text format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub block_rules: usize,
    pub criteria: usize,
    pub metrics: String,
}

pub struct ControlSurface {
    ledger: Arc<RuleLedger>,
    authority: Arc<EnforcementAuthority>,
    metrics: MetricsRecorder,
}

impl ControlSurface {
    pub fn new(authority: Arc<EnforcementAuthority>, metrics: MetricsRecorder) -> Self {
        Self {
            ledger: authority.ledger().clone(),
            authority,
            metrics,
        }
    }

    pub async fn list_rules(&self) -> Vec<BlockRule> {
        self.ledger.rules().await
    }

    pub async fn list_criteria(&self) -> Vec<String> {
        self.ledger.criteria().await
    }

    pub async fn status(&self) -> Result<StatusReport, ControlError> {
        let snapshot = self.ledger.snapshot().await;
        Ok(StatusReport {
            block_rules: snapshot.block_rules.len(),
            criteria: snapshot.blocking_strings.len(),
            metrics: self.metrics.gather_metrics()?,
        })
    }

    #[instrument(skip(self))]
    pub async fn add_criterion(&self, criterion: &str) -> Result<(), ControlError> {
        if criterion.trim().is_empty() {
            return Err(ControlError::Validation("blocking string must not be empty".into()));
        }
        if !self.ledger.add_criterion(criterion).await? {
            return Err(ControlError::AlreadyExists(format!(
                "blocking string {criterion:?}"
            )));
        }
        info!("Criterion added");
        EventLogger::log_event(
            "criterion_added",
            vec![KeyValue::new("block_string", criterion.to_string())],
        )
        .await;
        Ok(())
    }

    /// Drops `criterion` and unblocks every IP that was blocked because of it.
    ///
    /// Succeeds even when the criterion was not present; the cascade still runs
    /// so leftover rules from an earlier partial removal get cleaned up.
    #[instrument(skip(self))]
    pub async fn remove_criterion(&self, criterion: &str) -> Result<CascadeReport, ControlError> {
        let removed = self.ledger.remove_criterion(criterion).await?;
        let report = self.authority.unblock_by_criterion(criterion).await;
        self.metrics.unblocks.inc_by(report.unblocked.len() as u64);

        info!(
            removed,
            unblocked = report.unblocked.len(),
            failed = report.failures.len(),
            "Criterion removed"
        );
        EventLogger::log_event(
            "criterion_removed",
            vec![
                KeyValue::new("block_string", criterion.to_string()),
                KeyValue::new("unblocked", report.unblocked.len() as i64),
                KeyValue::new("failed", report.failures.len() as i64),
            ],
        )
        .await;
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn unblock_by_rule_name(
        &self,
        rule_name: &str,
    ) -> Result<UnblockOutcome, ControlError> {
        if rule_name.is_empty() {
            return Err(ControlError::Validation("missing rule name".into()));
        }
        let rule = self
            .ledger
            .find_by_rule_name(rule_name)
            .await
            .ok_or_else(|| ControlError::NotFound(format!("rule {rule_name:?}")))?;

        let outcome = self.authority.unblock(rule.ip).await?;
        if matches!(outcome, UnblockOutcome::Unblocked { .. }) {
            self.metrics.unblocks.inc();
        }
        Ok(outcome)
    }
}
