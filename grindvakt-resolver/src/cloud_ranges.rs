//! Cloud provider address ranges.
//!
//! The dataset is the provider's published `ip-ranges.json`. It is re-read on
//! every query, so replacing the file takes effect on the next lookup. A
//! missing or malformed file is an error, never an empty match set.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::ResolverError;

#[derive(Debug, Deserialize)]
struct IpRanges {
    prefixes: Vec<V4Prefix>,
    #[serde(default)]
    ipv6_prefixes: Vec<V6Prefix>,
}

#[derive(Debug, Deserialize)]
struct V4Prefix {
    ip_prefix: String,
}

#[derive(Debug, Deserialize)]
struct V6Prefix {
    ipv6_prefix: String,
}

/// Flat list of CIDR strings contained in a dataset document.
pub fn parse_prefixes(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let ranges: IpRanges = serde_json::from_str(json)?;
    Ok(ranges
        .prefixes
        .into_iter()
        .map(|p| p.ip_prefix)
        .chain(ranges.ipv6_prefixes.into_iter().map(|p| p.ipv6_prefix))
        .collect())
}

/// Containment test over a fixed set of networks.
#[derive(Debug, Clone, Default)]
pub struct RangeMatcher {
    networks: Vec<IpNetwork>,
}

impl RangeMatcher {
    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, ResolverError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|cidr| {
                let cidr = cidr.as_ref();
                cidr.parse::<IpNetwork>()
                    .map_err(|source| ResolverError::InvalidPrefix {
                        prefix: cidr.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|net| net.contains(ip))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CloudRangeIndex {
    path: PathBuf,
}

impl CloudRangeIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and compiles the dataset as it currently is on disk.
    pub async fn load(&self) -> Result<RangeMatcher, ResolverError> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ResolverError::DatasetRead {
                path: self.path.clone(),
                source,
            })?;
        let cidrs = parse_prefixes(&json).map_err(|source| ResolverError::DatasetFormat {
            path: self.path.clone(),
            source,
        })?;
        RangeMatcher::from_cidrs(cidrs)
    }

    pub async fn contains(&self, ip: IpAddr) -> Result<bool, ResolverError> {
        Ok(self.load().await?.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DATASET: &str = r#"{
        "syncToken": "1700000000",
        "prefixes": [
            {"ip_prefix": "52.95.110.0/24", "region": "us-east-1", "service": "AMAZON"},
            {"ip_prefix": "3.5.0.0/19", "region": "us-east-1", "service": "S3"}
        ],
        "ipv6_prefixes": [
            {"ipv6_prefix": "2600:1f18::/33", "region": "us-east-1", "service": "AMAZON"}
        ]
    }"#;

    fn dataset_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn flattens_both_families() {
        let cidrs = parse_prefixes(DATASET).unwrap();
        assert_eq!(cidrs, vec!["52.95.110.0/24", "3.5.0.0/19", "2600:1f18::/33"]);
    }

    #[tokio::test]
    async fn contains_members_of_either_family() {
        let file = dataset_file(DATASET);
        let index = CloudRangeIndex::new(file.path());

        assert!(index.contains("52.95.110.1".parse().unwrap()).await.unwrap());
        assert!(index.contains("2600:1f18::5".parse().unwrap()).await.unwrap());
        assert!(index.contains("::ffff:3.5.1.1".parse().unwrap()).await.unwrap());
        assert!(!index.contains("8.8.8.8".parse().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn rereads_the_file_on_each_query() {
        let file = dataset_file(r#"{"prefixes": []}"#);
        let index = CloudRangeIndex::new(file.path());
        let ip = "52.95.110.1".parse().unwrap();
        assert!(!index.contains(ip).await.unwrap());

        std::fs::write(file.path(), DATASET).unwrap();
        assert!(index.contains(ip).await.unwrap());
    }

    #[tokio::test]
    async fn missing_dataset_fails_loudly() {
        let index = CloudRangeIndex::new("/nonexistent/ip-ranges.json");
        assert!(matches!(
            index.contains("52.95.110.1".parse().unwrap()).await,
            Err(ResolverError::DatasetRead { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_dataset_fails_loudly() {
        let file = dataset_file(r#"{"prefixes": [{"ip_prefix": "not-a-cidr"}]}"#);
        let index = CloudRangeIndex::new(file.path());
        assert!(matches!(
            index.load().await,
            Err(ResolverError::InvalidPrefix { .. })
        ));

        let file = dataset_file("{ this is not json");
        let index = CloudRangeIndex::new(file.path());
        assert!(matches!(
            index.load().await,
            Err(ResolverError::DatasetFormat { .. })
        ));
    }
}
