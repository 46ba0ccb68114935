//! Persistent storage for actions using redb.
//!
//! A single `ACTIONS` table maps the action id (20 hex chars) to the
//! JSON-encoded `Action`. The id being the key gives the uniqueness
//! constraint the orchestrator relies on: `insert` rejects an id that
//! already exists, so a forged or colliding id can never silently
//! overwrite another action's record. `update_status` enforces the
//! single terminal transition — once an action is `Completed` or
//! `Failed` any further update is rejected.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::action::{Action, ActionStatus, OperationKind};
use crate::error::{Result, TfgateError};

/// Key: action id. Value: JSON-encoded Action.
const ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("actions");

/// Persistent store for `Action` records. Safe to share across tasks;
/// redb serializes write transactions internally.
pub struct ActionStore {
    db: Database,
}

impl ActionStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates the `ACTIONS` table if it doesn't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| TfgateError::Store(e.to_string()))?;
        // Ensure the table exists before any reads
        let wt = db
            .begin_write()
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        wt.open_table(ACTIONS)
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        wt.commit().map_err(|e| TfgateError::Store(e.to_string()))?;
        Ok(Self { db })
    }

    /// Insert a new action. Fails with `DuplicateAction` if the id is taken.
    pub fn insert(&self, action: &Action) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let wt = self
            .db
            .begin_write()
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(ACTIONS)
                .map_err(|e| TfgateError::Store(e.to_string()))?;
            let exists = table
                .get(action.id.as_str())
                .map_err(|e| TfgateError::Store(e.to_string()))?
                .is_some();
            if exists {
                return Err(TfgateError::DuplicateAction(action.id.clone()));
            }
            table
                .insert(action.id.as_str(), value.as_slice())
                .map_err(|e| TfgateError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| TfgateError::Store(e.to_string()))?;
        Ok(())
    }

    /// Transition an action to `status`, recording an error message for
    /// failures.
    ///
    /// Fails with `ActionNotFound` if the id is unknown and with
    /// `AlreadyTerminal` if the stored status is already terminal — a
    /// double-reporting background task gets its second update rejected
    /// here rather than clobbering the record.
    pub fn update_status(
        &self,
        id: &str,
        status: ActionStatus,
        error: Option<String>,
    ) -> Result<()> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(ACTIONS)
                .map_err(|e| TfgateError::Store(e.to_string()))?;
            let mut action: Action = {
                let raw = table
                    .get(id)
                    .map_err(|e| TfgateError::Store(e.to_string()))?
                    .ok_or_else(|| TfgateError::ActionNotFound(id.to_string()))?;
                serde_json::from_slice(raw.value())?
            };
            if action.status.is_terminal() {
                return Err(TfgateError::AlreadyTerminal {
                    id: id.to_string(),
                    status: action.status.as_str().to_string(),
                });
            }
            action.status = status;
            action.error = error;
            action.updated_at = Utc::now();
            let value = serde_json::to_vec(&action)?;
            table
                .insert(id, value.as_slice())
                .map_err(|e| TfgateError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| TfgateError::Store(e.to_string()))?;
        Ok(())
    }

    /// Fetch one action by id.
    pub fn find(&self, id: &str) -> Result<Action> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        let table = rt
            .open_table(ACTIONS)
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        let raw = table
            .get(id)
            .map_err(|e| TfgateError::Store(e.to_string()))?
            .ok_or_else(|| TfgateError::ActionNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(raw.value())?)
    }

    /// All actions of one operation kind, newest first.
    pub fn find_by_kind(&self, kind: OperationKind) -> Result<Vec<Action>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| TfgateError::Store(e.to_string()))?;
        let table = rt
            .open_table(ACTIONS)
            .map_err(|e| TfgateError::Store(e.to_string()))?;

        let mut result = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| TfgateError::Store(e.to_string()))?
        {
            let (_, v) = entry.map_err(|e| TfgateError::Store(e.to_string()))?;
            let action: Action = serde_json::from_slice(v.value())?;
            if action.kind == kind {
                result.push(action);
            }
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}
