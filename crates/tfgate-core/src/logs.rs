//! Log artifacts: the stdout/stderr file pair produced by one action.
//!
//! Written incrementally by the executor as the child process runs and
//! readable by id both mid-flight and after completion. Immutable once
//! the owning action reaches a terminal status.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, TfgateError};

/// Stdout artifact path for an action id.
pub fn out_path(log_dir: &Path, action_id: &str) -> PathBuf {
    log_dir.join(format!("{action_id}.out"))
}

/// Stderr artifact path for an action id.
pub fn err_path(log_dir: &Path, action_id: &str) -> PathBuf {
    log_dir.join(format!("{action_id}.err"))
}

/// The captured output of one action.
#[derive(Debug, Clone, Serialize)]
pub struct LogArtifact {
    pub stdout: String,
    pub stderr: String,
}

impl LogArtifact {
    /// Read both artifacts for `action_id`. A missing individual stream
    /// reads as empty, but if neither file exists the action has no
    /// artifacts at all and `LogNotFound` is returned.
    pub async fn read(log_dir: &Path, action_id: &str) -> Result<Self> {
        let out = tokio::fs::read_to_string(out_path(log_dir, action_id)).await;
        let err = tokio::fs::read_to_string(err_path(log_dir, action_id)).await;
        if out.is_err() && err.is_err() {
            return Err(TfgateError::LogNotFound(action_id.to_string()));
        }
        Ok(Self {
            stdout: out.unwrap_or_default(),
            stderr: err.unwrap_or_default(),
        })
    }
}
