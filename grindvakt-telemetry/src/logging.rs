//! ## grindvakt-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! Enforcement actions are emitted as `security_event` spans so they can be
//! filtered apart from routine pipeline chatter.

use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
    pub fn init(default_level: &str, json: bool) -> Result<(), InitError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        let builder = fmt().with_env_filter(filter).with_thread_names(true);
        if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    }

    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "security_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            tracing::info!(
                metadata = ?metadata,
                "Security event occurred"
            );
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_logging() {
        EventLogger::log_event(
            "firewall_block",
            vec![KeyValue::new("ip_address", "52.95.110.1")],
        )
        .await;
        assert!(logs_contain("Security event occurred"));
        assert!(logs_contain("52.95.110.1"));
    }
}
