//! Child-process execution with streamed log capture and a hard timeout.
//!
//! Spawns the external tool with piped stdio and drains stdout/stderr
//! line-by-line into the action's log artifact pair as they are
//! produced, so long-running operations never buffer their output in
//! memory. The wall-clock timeout is enforced with `tokio::select!`;
//! on expiry the child is killed and the outcome is `Timeout`, distinct
//! from a non-zero exit. Both artifacts are flushed and fsynced before
//! the outcome is returned on every exit path, so a poller that
//! observes the outcome sees complete files.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, TfgateError};
use crate::logs;

// ---------------------------------------------------------------------------
// ExecOutcome
// ---------------------------------------------------------------------------

/// Terminal outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Zero exit, artifacts finalized.
    Success,
    /// Non-zero exit with the given code (-1 if killed by a signal).
    Failure(i32),
    /// Killed after the deadline passed.
    Timeout,
}

impl ExecOutcome {
    /// Convert to the error the orchestrator records on the action.
    /// `timeout` is the configured bound, used in the timeout message.
    pub fn into_result(self, timeout: Duration) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(code) => Err(TfgateError::ExecutionFailed(code)),
            Self::Timeout => Err(TfgateError::ExecutionTimeout(timeout.as_secs())),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandExecutor
// ---------------------------------------------------------------------------

/// Runs external tool invocations, writing their output to per-action
/// log artifacts under `log_dir`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    log_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Run `program args` with working directory `config_dir`, bounded
    /// by `timeout`. Output streams into `<log_dir>/<action_id>.{out,err}`
    /// in append mode, so multi-step operations (init then plan) share
    /// one artifact pair.
    pub async fn run(
        &self,
        config_dir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
        action_id: &str,
    ) -> Result<ExecOutcome> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let out_file = open_append(&logs::out_path(&self.log_dir, action_id)).await?;
        let err_file = open_append(&logs::err_path(&self.log_dir, action_id)).await?;

        debug!(program, ?args, dir = %config_dir.display(), action_id, "spawning");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(config_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TfgateError::Exec("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TfgateError::Exec("stderr not captured".into()))?;

        let out_task = tokio::spawn(drain_to_file(stdout, out_file));
        let err_task = tokio::spawn(drain_to_file(stderr, err_file));

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep(timeout) => None,
        };

        let outcome = match status {
            Some(s) if s.success() => ExecOutcome::Success,
            Some(s) => ExecOutcome::Failure(s.code().unwrap_or(-1)),
            None => {
                warn!(action_id, program, "deadline passed, killing child");
                if let Err(e) = child.kill().await {
                    warn!(action_id, "failed to kill timed-out child: {e}");
                }
                ExecOutcome::Timeout
            }
        };

        // Killing the child closes its pipes; both drains terminate on
        // EOF. Join them so the artifacts are flushed and fsynced before
        // the outcome becomes observable.
        for task in [out_task, err_task] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(action_id, "log stream write failed: {e}"),
                Err(e) => warn!(action_id, "log stream task panicked: {e}"),
            }
        }

        debug!(action_id, ?outcome, "child finished");
        Ok(outcome)
    }
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

/// Copy lines from `reader` into `file` as they arrive, then flush and
/// fsync so concurrent readers see a complete artifact.
async fn drain_to_file<R>(reader: R, mut file: tokio::fs::File) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
