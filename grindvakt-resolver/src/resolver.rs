use std::net::IpAddr;
use std::sync::Arc;

use grindvakt_core::{Connection, ResolvedConnection};
use tracing::{debug, instrument};

use crate::{CloudRangeIndex, ResolverError, ReverseDns};

/// Resolution order, first success wins:
/// 1. first reverse DNS hostname
/// 2. `provider_label` when the IP is inside the cloud range dataset
/// 3. the IP itself
///
/// DNS failures degrade to "no hostname"; dataset failures are returned.
pub struct RemoteIdentityResolver {
    dns: Arc<dyn ReverseDns>,
    ranges: CloudRangeIndex,
    provider_label: String,
}

impl RemoteIdentityResolver {
    pub fn new(
        dns: Arc<dyn ReverseDns>,
        ranges: CloudRangeIndex,
        provider_label: impl Into<String>,
    ) -> Self {
        Self {
            dns,
            ranges,
            provider_label: provider_label.into(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, ip: IpAddr) -> Result<String, ResolverError> {
        match self.dns.reverse(ip).await {
            Ok(hostnames) => {
                if let Some(first) = hostnames.into_iter().find(|h| !h.is_empty()) {
                    return Ok(first);
                }
            }
            Err(e) => debug!("Reverse DNS unavailable for {ip}: {e}"),
        }

        if self.ranges.contains(ip).await? {
            return Ok(self.provider_label.clone());
        }
        Ok(ip.to_string())
    }

    pub async fn resolve_connection(
        &self,
        connection: Connection,
    ) -> Result<ResolvedConnection, ResolverError> {
        let label = self.resolve(connection.remote.address).await?;
        Ok(ResolvedConnection::new(connection, label))
    }
}
