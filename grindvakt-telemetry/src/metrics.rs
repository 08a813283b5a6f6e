//! ## grindvakt-telemetry::metrics
//! **Prometheus counters and histograms for the enforcement pipeline**

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub scan_ticks: IntCounter,
    pub connections_seen: IntCounter,
    pub connections_targeted: IntCounter,
    pub blocks: IntCounter,
    pub block_failures: IntCounter,
    pub unblocks: IntCounter,
    pub resolution_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let scan_ticks = counter("grindvakt_scan_ticks_total", "Completed scan ticks")?;
        let connections_seen =
            counter("grindvakt_connections_seen_total", "TCP connections enumerated")?;
        let connections_targeted = counter(
            "grindvakt_connections_targeted_total",
            "Connections owned by the target process",
        )?;
        let blocks = counter("grindvakt_blocks_total", "Firewall block rules installed")?;
        let block_failures = counter(
            "grindvakt_block_failures_total",
            "Firewall block attempts that failed",
        )?;
        let unblocks = counter("grindvakt_unblocks_total", "Firewall block rules removed")?;

        let resolution_latency = Histogram::with_opts(
            HistogramOpts::new(
                "grindvakt_resolution_latency_seconds",
                "Remote identity resolution time",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;
        registry.register(Box::new(resolution_latency.clone()))?;

        Ok(Self {
            registry,
            scan_ticks,
            connections_seen,
            connections_targeted,
            blocks,
            block_failures,
            unblocks,
            resolution_latency,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
