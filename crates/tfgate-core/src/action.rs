//! Action data model.
//!
//! An `Action` is one tracked infrastructure operation request: a
//! configuration name plus an operation kind, identified by a random id
//! the caller uses to poll status and fetch log artifacts. The
//! `(id, config_name, kind)` triple is fixed at creation; only `status`
//! and `error` mutate, exactly once, to a terminal value.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::TfgateError;

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// The infrastructure operations tfgate can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Plan,
    Apply,
    Destroy,
    Show,
    Import,
    Statefile,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Show => "show",
            Self::Import => "import",
            Self::Statefile => "statefile",
        }
    }

    /// Whether this kind requires an existing configuration directory.
    /// Import runs against the virtual `discovery` namespace instead.
    pub fn requires_config_dir(&self) -> bool {
        matches!(self, Self::Plan | Self::Apply | Self::Destroy | Self::Show)
    }
}

impl std::str::FromStr for OperationKind {
    type Err = TfgateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "apply" => Ok(Self::Apply),
            "destroy" => Ok(Self::Destroy),
            "show" => Ok(Self::Show),
            "import" => Ok(Self::Import),
            "statefile" => Ok(Self::Statefile),
            other => Err(TfgateError::InvalidOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action.
///
/// Transitions: `InProgress → Completed | Failed`. Completed and Failed
/// are terminal; the store rejects any further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    InProgress,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One tracked unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub config_name: String,
    pub kind: OperationKind,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    /// Create a new `InProgress` action with a fresh random id.
    pub fn new(config_name: impl Into<String>, kind: OperationKind) -> Self {
        let now = Utc::now();
        Self {
            id: generate_action_id(),
            config_name: config_name.into(),
            kind,
            status: ActionStatus::InProgress,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A 20-character hex identifier from 10 random bytes. Enough entropy
/// that concurrent submissions never collide in practice; the store's
/// uniqueness constraint catches the theoretical collision.
pub fn generate_action_id() -> String {
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
