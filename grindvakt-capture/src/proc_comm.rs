//! `/proc/<pid>/comm` process lookup (Linux).

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::{CaptureError, ProcessInspector};

pub struct ProcCommInspector {
    root: PathBuf,
}

impl Default for ProcCommInspector {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcCommInspector {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ProcessInspector for ProcCommInspector {
    async fn process_name(&self, pid: u32) -> Result<Option<String>, CaptureError> {
        let path = self.root.join(pid.to_string()).join("comm");
        match tokio::fs::read_to_string(&path).await {
            Ok(name) => {
                let name = name.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CaptureError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_comm_and_reports_missing() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("4242")).unwrap();
        std::fs::write(root.path().join("4242/comm"), "cursor\n").unwrap();

        let inspector = ProcCommInspector::with_root(root.path());
        assert_eq!(
            inspector.process_name(4242).await.unwrap().as_deref(),
            Some("cursor")
        );
        assert_eq!(inspector.process_name(9999).await.unwrap(), None);
    }
}
