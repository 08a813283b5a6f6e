//! Bounded execution of host utilities (`tasklist`, `netstat`, `netsh`, `iptables`).
//!
//! Every invocation carries a timeout; on expiry the child is killed and the
//! call reports [`CommandError::Timeout`] instead of hanging the pipeline.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::trace;

use crate::error::CommandError;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Converts a non-zero exit into [`CommandError::Failed`].
    pub fn into_success(self, program: &str) -> Result<Self, CommandError> {
        if self.success {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs `program` with `args`, waiting at most `timeout`.
///
/// A non-zero exit status is *not* an error here; callers decide whether the
/// exit code carries meaning (e.g. `iptables -C` answers "no" with status 1).
pub async fn run_command<S: AsRef<str>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    trace!(program, "Spawning host command");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                program: program.to_string(),
                source,
            })
        }
        Err(_elapsed) => {
            return Err(CommandError::Timeout {
                program: program.to_string(),
                timeout,
            })
        }
    };

    Ok(CommandOutput {
        status: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
