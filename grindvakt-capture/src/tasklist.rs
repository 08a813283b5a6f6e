//! `tasklist` process lookup (Windows).

use std::time::Duration;

use async_trait::async_trait;
use grindvakt_core::command::run_command;
use tracing::{instrument, trace};

use crate::{CaptureError, ProcessInspector};

pub struct TasklistInspector {
    timeout: Duration,
}

impl TasklistInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessInspector for TasklistInspector {
    #[instrument(level = "debug", skip(self))]
    async fn process_name(&self, pid: u32) -> Result<Option<String>, CaptureError> {
        let filter = format!("PID eq {pid}");
        let output = run_command(
            "tasklist",
            &["/FI", filter.as_str(), "/FO", "CSV", "/NH"],
            self.timeout,
        )
        .await?
        .into_success("tasklist")?;

        let name = parse_tasklist_csv(&output.stdout);
        trace!(pid, name = ?name, "tasklist answered");
        Ok(name)
    }
}

/// Image name of the first CSV record; `None` for the "no tasks" notice.
///
/// Records look like `"Cursor.exe","4242","Console","1","123,456 K"`.
pub fn parse_tasklist_csv(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('"'))
        .and_then(|line| line[1..].split('"').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_image_name() {
        let out = "\r\n\"Cursor.exe\",\"4242\",\"Console\",\"1\",\"123,456 K\"\r\n";
        assert_eq!(parse_tasklist_csv(out).as_deref(), Some("Cursor.exe"));
    }

    #[test]
    fn no_match_notice_is_none() {
        let out = "INFO: No tasks are running which match the specified criteria.\r\n";
        assert_eq!(parse_tasklist_csv(out), None);
        assert_eq!(parse_tasklist_csv(""), None);
    }
}
