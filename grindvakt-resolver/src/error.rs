use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Cannot read IP range dataset {path}: {source}")]
    DatasetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed IP range dataset {path}: {source}")]
    DatasetFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid prefix {prefix:?} in IP range dataset: {source}")]
    InvalidPrefix {
        prefix: String,
        #[source]
        source: ipnetwork::IpNetworkError,
    },

    #[error("Reverse DNS lookup failed: {0}")]
    Dns(String),

    #[error("Reverse DNS lookup timed out after {0:?}")]
    DnsTimeout(Duration),
}
