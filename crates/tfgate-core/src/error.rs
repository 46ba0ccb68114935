use thiserror::Error;

#[derive(Debug, Error)]
pub enum TfgateError {
    #[error("unsupported operation: {0}")]
    InvalidOperation(String),

    #[error("configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid configuration name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidConfigName(String),

    #[error("unsupported import command '{0}': expected 'default' or 'merge'")]
    InvalidImportCommand(String),

    #[error("action already exists: {0}")]
    DuplicateAction(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("action {id} already reached terminal status {status}")]
    AlreadyTerminal { id: String, status: String },

    #[error("no log artifacts for action: {0}")]
    LogNotFound(String),

    #[error("executor error: {0}")]
    Exec(String),

    #[error("command exited with code {0}")]
    ExecutionFailed(i32),

    #[error("command did not finish within {0} seconds and was killed")]
    ExecutionTimeout(u64),

    #[error("state reconciliation failed: {0}")]
    Reconcile(String),

    #[error("state reconciliation did not finish within {0} seconds")]
    ReconcileTimeout(u64),

    #[error("action store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TfgateError>;
