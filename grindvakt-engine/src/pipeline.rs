//! ## grindvakt-engine::pipeline
//! **Identify → resolve → decide → enforce, for one connection**

use std::sync::Arc;
use std::time::Instant;

use grindvakt_core::address::is_excluded_remote;
use grindvakt_core::Connection;
use grindvakt_detection::CriteriaMatcher;
use grindvakt_prevention::{BlockOutcome, EnforcementAuthority};
use grindvakt_resolver::RemoteIdentityResolver;
use grindvakt_telemetry::MetricsRecorder;
use tracing::{debug, instrument, warn};

use crate::error::EngineError;
use crate::identity::ProcessIdentityCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Remote address is local or unspecified.
    Excluded,
    /// Owner is unknown or not the target process.
    NotTarget,
    NoMatch { label: String },
    Enforced(BlockOutcome),
}

pub struct Pipeline {
    identity: Arc<ProcessIdentityCache>,
    resolver: Arc<RemoteIdentityResolver>,
    authority: Arc<EnforcementAuthority>,
    metrics: MetricsRecorder,
    target_process: String,
}

impl Pipeline {
    pub fn new(
        identity: Arc<ProcessIdentityCache>,
        resolver: Arc<RemoteIdentityResolver>,
        authority: Arc<EnforcementAuthority>,
        metrics: MetricsRecorder,
        target_process: &str,
    ) -> Self {
        Self {
            identity,
            resolver,
            authority,
            metrics,
            target_process: target_process.to_lowercase(),
        }
    }

    pub fn identity(&self) -> &Arc<ProcessIdentityCache> {
        &self.identity
    }

    fn is_target(&self, process_name: &str) -> bool {
        process_name.to_lowercase().contains(&self.target_process)
    }

    #[instrument(
        level = "debug",
        skip(self, connection, matcher),
        fields(pid = connection.pid, ip = %connection.remote.address)
    )]
    pub async fn process(
        &self,
        connection: Connection,
        matcher: &CriteriaMatcher,
    ) -> Result<PipelineOutcome, EngineError> {
        if connection.pid == 0 {
            return Ok(PipelineOutcome::NotTarget);
        }
        if is_excluded_remote(connection.remote.address) {
            return Ok(PipelineOutcome::Excluded);
        }

        let Some(process_name) = self.identity.resolve_process_name(connection.pid).await else {
            return Ok(PipelineOutcome::NotTarget);
        };
        if !self.is_target(&process_name) {
            return Ok(PipelineOutcome::NotTarget);
        }
        self.metrics.connections_targeted.inc();

        let started = Instant::now();
        let resolved = self.resolver.resolve_connection(connection).await;
        self.metrics
            .resolution_latency
            .observe(started.elapsed().as_secs_f64());
        let resolved = resolved.inspect_err(|e| warn!(error = %e, "Resolution failed"))?;

        let Some(criterion) = matcher.matched(&resolved.label) else {
            debug!(label = %resolved.label, "No criterion matched");
            return Ok(PipelineOutcome::NoMatch {
                label: resolved.label,
            });
        };

        let detail = resolved.detail(&process_name);
        match self.authority.block(resolved.ip(), criterion, detail).await {
            Ok(outcome) => {
                if matches!(outcome, BlockOutcome::Blocked(_)) {
                    self.metrics.blocks.inc();
                }
                Ok(PipelineOutcome::Enforced(outcome))
            }
            Err(e) => {
                self.metrics.block_failures.inc();
                Err(e.into())
            }
        }
    }
}
