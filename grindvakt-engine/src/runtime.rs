//! Wiring of platform adapters and engine components from configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use grindvakt_capture::{
    ConnectionSource, NetstatSource, ProcCommInspector, ProcNetSource, ProcessInspector,
    TasklistInspector,
};
use grindvakt_config::{FirewallBackend, GrindvaktConfig};
use grindvakt_core::RuleNamer;
use grindvakt_prevention::{
    EnforcementAuthority, FirewallController, IptablesFirewall, NetshFirewall, RetryPolicy,
    RuleLedger,
};
use grindvakt_resolver::{CloudRangeIndex, RemoteIdentityResolver, SystemDns};
use grindvakt_telemetry::MetricsRecorder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::channel::ControlServer;
use crate::control::ControlSurface;
use crate::error::EngineError;
use crate::identity::ProcessIdentityCache;
use crate::pipeline::Pipeline;
use crate::scan::ScanLoop;

/// Host adapters for one firewall backend.
pub struct HostAdapters {
    pub connections: Arc<dyn ConnectionSource>,
    pub inspector: Arc<dyn ProcessInspector>,
    pub firewall: Arc<dyn FirewallController>,
}

impl HostAdapters {
    pub fn for_config(config: &GrindvaktConfig) -> Self {
        let command_timeout = Duration::from_millis(config.prevention.command_timeout_ms);
        let list_timeout = Duration::from_millis(config.scan.list_timeout_ms);
        let lookup_timeout = Duration::from_millis(config.identity.lookup_timeout_ms);
        match config.prevention.backend {
            FirewallBackend::Netsh => Self {
                connections: Arc::new(NetstatSource::new(list_timeout)),
                inspector: Arc::new(TasklistInspector::new(lookup_timeout)),
                firewall: Arc::new(NetshFirewall::new(command_timeout)),
            },
            FirewallBackend::Iptables => Self {
                connections: Arc::new(ProcNetSource::default()),
                inspector: Arc::new(ProcCommInspector::default()),
                firewall: Arc::new(IptablesFirewall::new(
                    RuleNamer::new(config.prevention.rule_prefix.clone()),
                    command_timeout,
                )),
            },
        }
    }
}

/// Everything needed either to run the scan loop or to serve operator commands.
pub struct Runtime {
    pub scan: ScanLoop,
    pub control: Arc<ControlSurface>,
    pub metrics: MetricsRecorder,
    control_listen: SocketAddr,
}

impl Runtime {
    pub async fn from_config(config: &GrindvaktConfig) -> Result<Self, EngineError> {
        Self::with_adapters(config, HostAdapters::for_config(config)).await
    }

    #[instrument(level = "info", name = "runtime_setup", skip_all)]
    pub async fn with_adapters(
        config: &GrindvaktConfig,
        adapters: HostAdapters,
    ) -> Result<Self, EngineError> {
        let metrics = MetricsRecorder::new()?;

        let ledger = Arc::new(
            RuleLedger::open(
                &config.ledger.path,
                &config.ledger.seed_criteria,
                RetryPolicy {
                    max_retries: config.ledger.write_retries,
                    initial_backoff: Duration::from_millis(config.ledger.retry_backoff_ms),
                },
            )
            .await?,
        );

        let ttl = match config.identity.cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let identity = Arc::new(ProcessIdentityCache::new(
            adapters.inspector,
            ttl,
            Duration::from_millis(config.identity.lookup_timeout_ms),
        ));

        let resolver = Arc::new(RemoteIdentityResolver::new(
            Arc::new(SystemDns::new(Duration::from_millis(
                config.resolver.dns_timeout_ms,
            ))),
            CloudRangeIndex::new(&config.resolver.ip_ranges_path),
            config.resolver.provider_label.clone(),
        ));

        let authority = Arc::new(EnforcementAuthority::new(
            adapters.firewall,
            ledger.clone(),
            RuleNamer::new(config.prevention.rule_prefix.clone()),
            config.prevention.whitelist.clone(),
        ));

        let pipeline = Arc::new(Pipeline::new(
            identity,
            resolver,
            authority.clone(),
            metrics.clone(),
            &config.scan.target_process,
        ));

        let scan = ScanLoop::new(
            adapters.connections,
            pipeline,
            ledger,
            metrics.clone(),
            Duration::from_millis(config.scan.interval_ms),
            Duration::from_millis(config.scan.list_timeout_ms),
            config.scan.max_concurrent_pipelines,
        );
        let control = Arc::new(ControlSurface::new(authority, metrics.clone()));

        info!(
            backend = ?config.prevention.backend,
            target = %config.scan.target_process,
            "Runtime ready"
        );
        Ok(Self {
            scan,
            control,
            metrics,
            control_listen: config.control.listen,
        })
    }

    /// Serves operator commands and scans until `shutdown` fires.
    ///
    /// Fails before the first tick when the control address is taken, which
    /// also keeps a second daemon off the same ledger.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        let server = ControlServer::bind(self.control_listen, self.control.clone()).await?;
        if let Ok(addr) = server.local_addr() {
            info!(%addr, "Control channel listening");
        }
        let serving = tokio::spawn(server.serve(shutdown.clone()));

        self.scan.run(shutdown).await;
        if let Err(e) = serving.await {
            error!(error = %e, "Control channel task panicked");
        }
        Ok(())
    }
}
