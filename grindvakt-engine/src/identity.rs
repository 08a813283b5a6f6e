//! PID → process image name, memoized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use grindvakt_capture::ProcessInspector;
use parking_lot::RwLock;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` is the unknown sentinel: not found, tool error or timeout.
    name: Option<String>,
    cached_at: Instant,
}

pub struct ProcessIdentityCache {
    inspector: Arc<dyn ProcessInspector>,
    entries: RwLock<HashMap<u32, CacheEntry>>,
    /// `None` keeps entries for the lifetime of the process.
    ttl: Option<Duration>,
    lookup_timeout: Duration,
}

impl ProcessIdentityCache {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        ttl: Option<Duration>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            inspector,
            entries: RwLock::new(HashMap::new()),
            ttl,
            lookup_timeout,
        }
    }

    fn cached(&self, pid: u32) -> Option<Option<String>> {
        let entries = self.entries.read();
        let entry = entries.get(&pid)?;
        match self.ttl {
            Some(ttl) if entry.cached_at.elapsed() >= ttl => None,
            _ => Some(entry.name.clone()),
        }
    }

    /// Name of the process owning `pid`. PID 0 is never looked up.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_process_name(&self, pid: u32) -> Option<String> {
        if pid == 0 {
            return None;
        }
        if let Some(hit) = self.cached(pid) {
            return hit;
        }

        let name = match tokio::time::timeout(
            self.lookup_timeout,
            self.inspector.process_name(pid),
        )
        .await
        {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                debug!(error = %e, "Process lookup failed");
                None
            }
            Err(_) => {
                debug!("Process lookup timed out");
                None
            }
        };

        self.entries.write().insert(
            pid,
            CacheEntry {
                name: name.clone(),
                cached_at: Instant::now(),
            },
        );
        name
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops expired entries so PIDs of long-gone processes do not accumulate.
    pub fn purge_expired(&self) {
        if let Some(ttl) = self.ttl {
            self.entries
                .write()
                .retain(|_, entry| entry.cached_at.elapsed() < ttl);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use grindvakt_capture::CaptureError;
    use grindvakt_core::CommandError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Inspector answering from a fixed table, counting lookups.
    #[derive(Default)]
    pub(crate) struct FakeInspector {
        pub names: HashMap<u32, String>,
        pub failing: Vec<u32>,
        pub calls: AtomicUsize,
    }

    impl FakeInspector {
        pub(crate) fn with(names: &[(u32, &str)]) -> Self {
            Self {
                names: names.iter().map(|(p, n)| (*p, n.to_string())).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProcessInspector for FakeInspector {
        async fn process_name(&self, pid: u32) -> Result<Option<String>, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&pid) {
                return Err(CaptureError::Command(CommandError::Failed {
                    program: "tasklist".into(),
                    status: Some(1),
                    stderr: "access denied".into(),
                }));
            }
            Ok(self.names.get(&pid).cloned())
        }
    }

    fn cache(inspector: Arc<FakeInspector>, ttl: Option<Duration>) -> ProcessIdentityCache {
        ProcessIdentityCache::new(inspector, ttl, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn pid_zero_is_rejected_without_lookup() {
        let inspector = Arc::new(FakeInspector::with(&[(0, "System Idle Process")]));
        let cache = cache(inspector.clone(), None);
        assert_eq!(cache.resolve_process_name(0).await, None);
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hits_are_memoized() {
        let inspector = Arc::new(FakeInspector::with(&[(4242, "Cursor.exe")]));
        let cache = cache(inspector.clone(), None);
        assert_eq!(cache.resolve_process_name(4242).await.as_deref(), Some("Cursor.exe"));
        assert_eq!(cache.resolve_process_name(4242).await.as_deref(), Some("Cursor.exe"));
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_and_misses_are_cached_as_unknown() {
        let mut inspector = FakeInspector::with(&[]);
        inspector.failing.push(7);
        let inspector = Arc::new(inspector);
        let cache = cache(inspector.clone(), None);

        assert_eq!(cache.resolve_process_name(7).await, None);
        assert_eq!(cache.resolve_process_name(8).await, None);
        assert_eq!(cache.resolve_process_name(7).await, None);
        assert_eq!(cache.resolve_process_name(8).await, None);
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_looked_up_again() {
        let inspector = Arc::new(FakeInspector::with(&[(4242, "Cursor.exe")]));
        let cache = cache(inspector.clone(), Some(Duration::from_millis(10)));
        cache.resolve_process_name(4242).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.resolve_process_name(4242).await;
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.purge_expired();
        assert!(cache.is_empty());
    }
}
