use async_trait::async_trait;
use grindvakt_core::Connection;

use crate::CaptureError;

/// Enumerates TCP connections visible to the host, in every state.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn tcp_connections(&self) -> Result<Vec<Connection>, CaptureError>;
}

/// Looks up a process image name by PID.
///
/// `Ok(None)` means the OS answered and no such process exists; `Err` means
/// the lookup itself could not be performed.
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    async fn process_name(&self, pid: u32) -> Result<Option<String>, CaptureError>;
}
