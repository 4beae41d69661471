use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, StagehandError};
use crate::shipper::LogPipeline;

/// Result of one external-process run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Exit code, if the process exited normally (None on signal kill).
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// True when the run was killed for exceeding the time limit.
    pub timed_out: bool,
}

/// Launches the opaque executable and streams its output.
///
/// The argument list is passed directly to the OS, never through a shell.
/// stdout and stderr are drained concurrently line-by-line so a full pipe
/// buffer on one stream can never stall the child.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Kill the child when it runs longer than this. None means unbounded.
    pub max_run: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(max_run: Option<Duration>) -> Self {
        Self { max_run }
    }

    /// Run the executable to completion, forwarding stdout lines at info
    /// level and stderr lines at error level as they arrive. Blocks the
    /// calling task until exit; does not interpret the exit code.
    pub async fn run(
        &self,
        executable: &Path,
        args: &[String],
        working_dir: &Path,
        logs: &LogPipeline,
    ) -> Result<RunOutcome> {
        tracing::info!(
            executable = ?executable,
            args = ?args,
            working_dir = ?working_dir,
            "Launching external process"
        );

        let start = Instant::now();
        let mut child = Command::new(executable)
            .args(args)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StagehandError::Execution(format!("spawn {executable:?}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StagehandError::Execution("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StagehandError::Execution("failed to capture stderr".to_string()))?;

        let stdout_logs = logs.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stdout_logs.info(line);
            }
        });

        let stderr_logs = logs.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_logs.error(line);
            }
        });

        let (status, timed_out) = match self.max_run {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => (
                    waited.map_err(|e| StagehandError::Execution(format!("wait: {e}")))?,
                    false,
                ),
                Err(_) => {
                    tracing::warn!(limit = ?limit, "Run exceeded time limit, killing process");
                    child
                        .kill()
                        .await
                        .map_err(|e| StagehandError::Execution(format!("kill: {e}")))?;
                    let status = child
                        .wait()
                        .await
                        .map_err(|e| StagehandError::Execution(format!("wait: {e}")))?;
                    (status, true)
                }
            },
            None => (
                child
                    .wait()
                    .await
                    .map_err(|e| StagehandError::Execution(format!("wait: {e}")))?,
                false,
            ),
        };

        // Readers finish once the pipes close.
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let outcome = RunOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
            timed_out,
        };

        tracing::info!(
            exit_code = ?outcome.exit_code,
            duration_secs = outcome.duration.as_secs_f64(),
            timed_out = outcome.timed_out,
            "External process exited"
        );
        Ok(outcome)
    }
}
