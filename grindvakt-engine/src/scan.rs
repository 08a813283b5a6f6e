//! ## grindvakt-engine::scan
//! **Periodic enumeration of connections and fan-out to pipelines**
//!
//! Each tick takes one snapshot of the criteria, lists every TCP connection
//! and runs one independent pipeline task per connection, bounded by a
//! semaphore. A tick completes only when all of its pipelines have finished.

use std::sync::Arc;
use std::time::Duration;

use grindvakt_capture::ConnectionSource;
use grindvakt_detection::CriteriaMatcher;
use grindvakt_prevention::{BlockOutcome, RuleLedger};
use grindvakt_telemetry::MetricsRecorder;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::error::EngineError;
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Counts for one completed tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub connections: usize,
    pub blocked: usize,
    pub failed: usize,
}

pub struct ScanLoop {
    source: Arc<dyn ConnectionSource>,
    pipeline: Arc<Pipeline>,
    ledger: Arc<RuleLedger>,
    metrics: MetricsRecorder,
    interval: Duration,
    list_timeout: Duration,
    workers: Arc<Semaphore>,
}

impl ScanLoop {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        pipeline: Arc<Pipeline>,
        ledger: Arc<RuleLedger>,
        metrics: MetricsRecorder,
        interval: Duration,
        list_timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            source,
            pipeline,
            ledger,
            metrics,
            interval,
            list_timeout,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Runs ticks until `shutdown` fires. A tick in progress is drained first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.interval.as_millis() as u64, "Scan loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.tick().await {
                Ok(report) => debug!(?report, "Tick complete"),
                Err(e) => error!(error = %e, "Tick failed"),
            }
            self.pipeline.identity().purge_expired();
        }
        info!("Scan loop stopped");
    }

    #[instrument(level = "debug", name = "scan_tick", skip(self))]
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        let criteria = self.ledger.criteria().await;
        let matcher = Arc::new(CriteriaMatcher::new(criteria)?);

        let connections =
            match tokio::time::timeout(self.list_timeout, self.source.tcp_connections()).await {
                Ok(listed) => listed?,
                Err(_) => return Err(EngineError::ListTimeout(self.list_timeout)),
            };
        self.metrics.scan_ticks.inc();
        self.metrics.connections_seen.inc_by(connections.len() as u64);

        let mut report = TickReport {
            connections: connections.len(),
            ..TickReport::default()
        };
        let mut tasks = JoinSet::new();
        for connection in connections {
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let pipeline = self.pipeline.clone();
            let matcher = matcher.clone();
            let span = info_span!("pipeline", pid = connection.pid);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    pipeline.process(connection, &matcher).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(PipelineOutcome::Enforced(BlockOutcome::Blocked(_)))) => report.blocked += 1,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "Pipeline failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Pipeline task panicked");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::FakeInspector;
    use crate::identity::ProcessIdentityCache;
    use crate::pipeline::tests::{connection, StaticDns};
    use async_trait::async_trait;
    use grindvakt_capture::CaptureError;
    use grindvakt_core::{Connection, RuleNamer};
    use grindvakt_prevention::test_utils::FakeFirewall;
    use grindvakt_prevention::{EnforcementAuthority, LedgerState};
    use grindvakt_resolver::{CloudRangeIndex, RemoteIdentityResolver};
    use std::collections::HashMap;

    struct StaticConnections(Vec<Connection>);

    #[async_trait]
    impl ConnectionSource for StaticConnections {
        async fn tcp_connections(&self) -> Result<Vec<Connection>, CaptureError> {
            Ok(self.0.clone())
        }
    }

    struct Setup {
        scan: ScanLoop,
        firewall: Arc<FakeFirewall>,
        ledger: Arc<RuleLedger>,
        metrics: MetricsRecorder,
        _dir: tempfile::TempDir,
    }

    fn setup(connections: Vec<Connection>) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let ranges = dir.path().join("ip-ranges.json");
        std::fs::write(
            &ranges,
            r#"{"prefixes":[{"ip_prefix":"52.95.0.0/16"}],"ipv6_prefixes":[{"ipv6_prefix":"2600:1f18::/33"}]}"#,
        )
        .unwrap();

        let identity = Arc::new(ProcessIdentityCache::new(
            Arc::new(FakeInspector::with(&[(4242, "Cursor.exe"), (77, "chrome.exe")])),
            None,
            Duration::from_secs(1),
        ));
        let resolver = Arc::new(RemoteIdentityResolver::new(
            Arc::new(StaticDns(HashMap::new())),
            CloudRangeIndex::new(&ranges),
            "aws.amazon.com",
        ));
        let firewall = Arc::new(FakeFirewall::new());
        let ledger = Arc::new(RuleLedger::in_memory(LedgerState {
            block_rules: Vec::new(),
            blocking_strings: vec!["s3".into(), "aws.amazon.com".into()],
        }));
        let authority = Arc::new(EnforcementAuthority::new(
            firewall.clone(),
            ledger.clone(),
            RuleNamer::default(),
            Vec::new(),
        ));
        let metrics = MetricsRecorder::new().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            identity,
            resolver,
            authority,
            metrics.clone(),
            "cursor",
        ));
        let scan = ScanLoop::new(
            Arc::new(StaticConnections(connections)),
            pipeline,
            ledger.clone(),
            metrics.clone(),
            Duration::from_millis(10),
            Duration::from_secs(1),
            4,
        );
        Setup {
            scan,
            firewall,
            ledger,
            metrics,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn tick_blocks_target_connections_only() {
        let s = setup(vec![
            connection("52.95.110.1", 4242),
            connection("2600:1f18::10", 4242),
            connection("127.0.0.1", 4242),
            connection("52.95.110.2", 77),
            connection("93.184.216.34", 4242),
        ]);

        let report = s.scan.tick().await.unwrap();
        assert_eq!(
            report,
            TickReport {
                connections: 5,
                blocked: 2,
                failed: 0
            }
        );
        assert_eq!(
            s.firewall.installed(),
            vec!["Block_IP_2600:1f18::10", "Block_IP_52.95.110.1"]
        );
        assert_eq!(s.metrics.connections_seen.get(), 5);
        assert_eq!(s.metrics.blocks.get(), 2);
    }

    #[tokio::test]
    async fn repeated_ticks_are_idempotent() {
        let s = setup(vec![
            connection("52.95.110.1", 4242),
            connection("52.95.110.1", 4242),
        ]);
        s.scan.tick().await.unwrap();
        let second = s.scan.tick().await.unwrap();

        assert_eq!(second.blocked, 0);
        assert_eq!(s.firewall.add_calls(), 1);
        assert_eq!(s.ledger.rules().await.len(), 1);
    }

    #[tokio::test]
    async fn criteria_changes_apply_on_next_tick() {
        let s = setup(vec![connection("93.184.216.34", 4242)]);
        assert_eq!(s.scan.tick().await.unwrap().blocked, 0);

        s.ledger.add_criterion("93.184").await.unwrap();
        assert_eq!(s.scan.tick().await.unwrap().blocked, 1);
        assert_eq!(s.ledger.rules().await[0].block_string, "93.184");
    }

    #[tokio::test]
    async fn enforcement_failure_is_counted_and_retried() {
        let s = setup(vec![connection("52.95.110.1", 4242)]);
        s.firewall.fail_adds(true);
        assert_eq!(s.scan.tick().await.unwrap().failed, 1);
        assert!(s.ledger.rules().await.is_empty());

        s.firewall.fail_adds(false);
        assert_eq!(s.scan.tick().await.unwrap().blocked, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let s = setup(vec![connection("52.95.110.1", 4242)]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), s.scan.run(token))
            .await
            .unwrap();
        assert!(s.metrics.scan_ticks.get() >= 1);
        assert_eq!(s.firewall.installed(), vec!["Block_IP_52.95.110.1"]);
    }
}
