//! Action orchestration: admission, background execution, finalization.
//!
//! `submit` turns a synchronous operation request into a tracked
//! background job: it validates the request, persists an `InProgress`
//! action, launches the work on a detached tokio task, and returns the
//! fresh action record immediately so the caller can poll. The
//! background task drives the command executor (and, for merge imports,
//! the state reconciler), then writes exactly one terminal status and
//! notifies the sink once per terminal transition. Failures inside the
//! task are always converted into a `Failed` status — they never
//! propagate out of the task.
//!
//! There is deliberately no per-configuration lock: distinct actions
//! against the same configuration may run concurrently, and callers are
//! responsible for not submitting conflicting operations. The store's
//! id uniqueness and single-terminal-transition rules are the only
//! concurrency controls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::action::{Action, ActionStatus, OperationKind};
use crate::config::TfgateConfig;
use crate::error::{Result, TfgateError};
use crate::executor::CommandExecutor;
use crate::io;
use crate::notify::{Notifier, StatusNote};
use crate::paths;
use crate::reconcile::{self, MatchPolicy, StateSnapshot};
use crate::store::ActionStore;

// ---------------------------------------------------------------------------
// Submission parameters
// ---------------------------------------------------------------------------

/// How a discovery import feeds the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportCommand {
    /// Import into the directory and stop.
    Default,
    /// Import, then reconcile the discovered snapshot into the target.
    Merge,
}

impl std::str::FromStr for ImportCommand {
    type Err = TfgateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "merge" => Ok(Self::Merge),
            other => Err(TfgateError::InvalidImportCommand(other.to_string())),
        }
    }
}

/// Per-request parameters accompanying a submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitParams {
    /// Webhook for the fire-and-forget notification sink.
    pub webhook_url: Option<String>,
    /// Import only: how to apply the discovered state.
    pub import_command: Option<ImportCommand>,
    /// Import/statefile: which services to import or restore.
    pub services: Vec<String>,
    /// Import only: tag filter passed through to the discovery tool.
    pub tags: Option<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    root: PathBuf,
    store: Arc<ActionStore>,
    executor: CommandExecutor,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    terraform_bin: String,
    terraformer_bin: String,
    match_policy: MatchPolicy,
}

impl Orchestrator {
    pub fn new(
        config: &TfgateConfig,
        store: Arc<ActionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        io::ensure_dir(&config.data_dir)?;
        let log_dir = paths::log_dir(&config.data_dir);
        io::ensure_dir(&log_dir)?;
        Ok(Self {
            root: config.data_dir.clone(),
            store,
            executor: CommandExecutor::new(log_dir),
            notifier,
            timeout: config.operation_timeout(),
            terraform_bin: config.terraform_bin.clone(),
            terraformer_bin: config.terraformer_bin.clone(),
            match_policy: config.match_policy.clone(),
        })
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.executor.log_dir().to_path_buf()
    }

    /// Create a configuration directory (or the virtual `discovery`
    /// namespace). Idempotent.
    pub fn create_config(&self, config_name: &str) -> Result<()> {
        paths::validate_config_name(config_name)?;
        io::ensure_dir(&paths::config_dir(&self.root, config_name))
    }

    /// Remove a configuration directory and everything under it.
    pub fn delete_config(&self, config_name: &str) -> Result<()> {
        paths::validate_config_name(config_name)?;
        let dir = paths::config_dir(&self.root, config_name);
        if !dir.is_dir() {
            return Err(TfgateError::ConfigNotFound(config_name.to_string()));
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    /// Admit an operation: validate, persist the `InProgress` record,
    /// launch the background task, and return immediately.
    pub fn submit(
        self: &Arc<Self>,
        config_name: &str,
        kind: OperationKind,
        params: SubmitParams,
    ) -> Result<Action> {
        paths::validate_config_name(config_name)?;
        self.validate(config_name, kind, &params)?;

        let action = Action::new(config_name, kind);
        self.store.insert(&action)?;
        info!(id = %action.id, config = config_name, kind = %kind, "action admitted");

        let note = self.status_note(&action);
        self.notifier.notify(params.webhook_url.as_deref(), &note);

        let orch = Arc::clone(self);
        let task_action = action.clone();
        tokio::spawn(async move {
            let result = orch.execute(&task_action, &params).await;
            orch.finalize(&task_action, params.webhook_url.as_deref(), result);
        });

        Ok(action)
    }

    fn validate(&self, config_name: &str, kind: OperationKind, params: &SubmitParams) -> Result<()> {
        if kind.requires_config_dir() && !paths::config_dir(&self.root, config_name).is_dir() {
            return Err(TfgateError::ConfigNotFound(config_name.to_string()));
        }
        if kind == OperationKind::Import && params.import_command.is_none() {
            return Err(TfgateError::InvalidImportCommand("<missing>".to_string()));
        }
        Ok(())
    }

    // -- background execution ------------------------------------------------

    async fn execute(&self, action: &Action, params: &SubmitParams) -> Result<()> {
        match action.kind {
            OperationKind::Plan => {
                self.terraform(action, &["init", "-no-color"]).await?;
                self.terraform(action, &["plan", "-no-color"]).await
            }
            OperationKind::Apply => {
                self.terraform(action, &["init", "-no-color"]).await?;
                self.terraform(action, &["apply", "-auto-approve", "-no-color"])
                    .await
            }
            OperationKind::Destroy => {
                self.terraform(action, &["destroy", "-auto-approve", "-no-color"])
                    .await
            }
            OperationKind::Show => self.terraform(action, &["show", "-no-color"]).await,
            OperationKind::Import => self.import(action, params).await,
            OperationKind::Statefile => self.restore_statefiles(action, &params.services).await,
        }
    }

    async fn terraform(&self, action: &Action, args: &[&str]) -> Result<()> {
        let config_dir = paths::config_dir(&self.root, &action.config_name);
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let outcome = self
            .executor
            .run(
                &config_dir,
                &self.terraform_bin,
                &args,
                self.timeout,
                &action.id,
            )
            .await?;
        outcome.into_result(self.timeout)
    }

    /// Run the discovery tool, then — for merge imports — reconcile the
    /// discovered snapshot into the configuration's snapshot.
    async fn import(&self, action: &Action, params: &SubmitParams) -> Result<()> {
        let command = params
            .import_command
            .ok_or_else(|| TfgateError::InvalidImportCommand("<missing>".to_string()))?;

        // Merge always discovers into the scratch namespace; a default
        // import lands directly in the requested configuration.
        let discovery_dir = match command {
            ImportCommand::Merge => paths::config_dir(&self.root, paths::DISCOVERY_CONFIG),
            ImportCommand::Default => paths::config_dir(&self.root, &action.config_name),
        };
        // Start from a clean slate so a previous import's snapshot can't
        // leak into this one.
        if command == ImportCommand::Merge && discovery_dir.is_dir() {
            tokio::fs::remove_dir_all(&discovery_dir).await?;
        }
        tokio::fs::create_dir_all(&discovery_dir).await?;

        let mut args = vec!["import".to_string(), "ibm".to_string()];
        if !params.services.is_empty() {
            args.push(format!("--resources={}", params.services.join(",")));
        }
        if let Some(tags) = &params.tags {
            args.push(format!("--filter={tags}"));
        }

        let outcome = self
            .executor
            .run(
                &discovery_dir,
                &self.terraformer_bin,
                &args,
                self.timeout,
                &action.id,
            )
            .await?;
        outcome.into_result(self.timeout)?;

        if command == ImportCommand::Merge {
            self.merge_discovered(action, &discovery_dir).await?;
        }
        Ok(())
    }

    async fn merge_discovered(&self, action: &Action, discovery_dir: &std::path::Path) -> Result<()> {
        let target_path = paths::state_file(&self.root, &action.config_name);
        let discovered_path = discovery_dir.join(paths::STATE_FILE);

        let target = StateSnapshot::read(&target_path)?;
        let discovered = StateSnapshot::read(&discovered_path)?;

        if reconcile::are_equivalent(&target, &discovered, &self.match_policy) {
            info!(id = %action.id, "snapshots already equivalent, nothing to merge");
            return Ok(());
        }

        reconcile::merge_state_files(
            &target_path,
            &discovered_path,
            &self.match_policy,
            self.timeout,
        )
        .await?;
        Ok(())
    }

    /// Restore each service's snapshot from its sibling backup.
    async fn restore_statefiles(&self, action: &Action, services: &[String]) -> Result<()> {
        let base = paths::config_dir(&self.root, &action.config_name)
            .join("generated")
            .join("ibm");
        for service in services {
            let state = base.join(service).join(paths::STATE_FILE);
            let backup = io::backup_path(&state);
            tokio::fs::copy(&backup, &state).await.map_err(|e| {
                TfgateError::Reconcile(format!(
                    "restore of '{service}' from {} failed: {e}",
                    backup.display()
                ))
            })?;
            info!(id = %action.id, service, "restored snapshot from backup");
        }
        Ok(())
    }

    // -- finalization --------------------------------------------------------

    /// Write the single terminal transition and notify the sink.
    fn finalize(&self, action: &Action, webhook_url: Option<&str>, result: Result<()>) {
        let (status, err_msg) = match result {
            Ok(()) => (ActionStatus::Completed, None),
            Err(e) => (ActionStatus::Failed, Some(e.to_string())),
        };

        match self.store.update_status(&action.id, status, err_msg.clone()) {
            Ok(()) => {
                if let Some(msg) = &err_msg {
                    error!(id = %action.id, kind = %action.kind, "action failed: {msg}");
                } else {
                    info!(id = %action.id, kind = %action.kind, "action completed");
                }
                let mut note = self.status_note(action);
                note.status = status.as_str().to_string();
                self.notifier.notify(webhook_url, &note);
            }
            // A second terminal report or a vanished record: refuse to
            // clobber, surface in the logs only.
            Err(e) => warn!(id = %action.id, "terminal update rejected: {e}"),
        }
    }

    fn status_note(&self, action: &Action) -> StatusNote {
        StatusNote {
            config_name: action.config_name.clone(),
            operation: action.kind.as_str().to_string(),
            action_id: action.id.clone(),
            status: action.status.as_str().to_string(),
            stdout_url: format!("/v1/logs/{}.out", action.id),
            stderr_url: format!("/v1/logs/{}.err", action.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use serde_json::json;
    use std::time::Instant;
    use tempfile::TempDir;

    /// Install an executable stub script named `name` under `dir` and
    /// return `dir` for PATH-free invocation via absolute path.
    fn install_stub(dir: &std::path::Path, name: &str, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn orchestrator_with(
        dir: &TempDir,
        terraform_script: &str,
        timeout_secs: u64,
    ) -> Arc<Orchestrator> {
        let config = TfgateConfig {
            data_dir: dir.path().join("data"),
            terraform_bin: install_stub(dir.path(), "terraform", terraform_script),
            terraformer_bin: install_stub(dir.path(), "terraformer", "exit 0"),
            operation_timeout_secs: timeout_secs,
            ..TfgateConfig::default()
        };
        let store = Arc::new(
            ActionStore::open(&dir.path().join("actions.redb")).unwrap(),
        );
        Arc::new(Orchestrator::new(&config, store, Arc::new(NoopNotifier)).unwrap())
    }

    async fn wait_terminal(orch: &Orchestrator, id: &str) -> Action {
        for _ in 0..200 {
            let action = orch.store().find(id).unwrap();
            if action.status.is_terminal() {
                return action;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("action {id} never reached a terminal status");
    }

    #[tokio::test]
    async fn submit_requires_existing_config_dir() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);

        let err = orch
            .submit("ghost", OperationKind::Plan, SubmitParams::default())
            .unwrap_err();
        assert!(matches!(err, TfgateError::ConfigNotFound(_)));
        // Validation failure: no action was created
        assert!(orch.store().find_by_kind(OperationKind::Plan).unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_bad_config_name() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);

        let err = orch
            .submit("../escape", OperationKind::Plan, SubmitParams::default())
            .unwrap_err();
        assert!(matches!(err, TfgateError::InvalidConfigName(_)));
    }

    #[tokio::test]
    async fn submit_returns_immediately_while_operation_runs() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "sleep 20", 60);
        orch.create_config("demo").unwrap();

        let start = Instant::now();
        let action = orch
            .submit("demo", OperationKind::Plan, SubmitParams::default())
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(action.status, ActionStatus::InProgress);

        let stored = orch.store().find(&action.id).unwrap();
        assert_eq!(stored.status, ActionStatus::InProgress);
    }

    #[tokio::test]
    async fn plan_lifecycle_completes_with_log_artifacts() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "echo ran-$1", 10);
        orch.create_config("demo").unwrap();

        let action = orch
            .submit("demo", OperationKind::Plan, SubmitParams::default())
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Completed);
        assert!(done.error.is_none());

        // Both init and plan wrote to the same artifact pair
        let log = crate::logs::LogArtifact::read(&orch.log_dir(), &action.id)
            .await
            .unwrap();
        assert_eq!(log.stdout, "ran-init\nran-plan\n");
    }

    #[tokio::test]
    async fn failing_command_yields_failed_with_exit_code() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 2", 10);
        orch.create_config("demo").unwrap();

        let action = orch
            .submit("demo", OperationKind::Show, SubmitParams::default())
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("code 2"));
    }

    #[tokio::test]
    async fn slow_command_fails_with_timeout_message() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "sleep 30", 1);
        orch.create_config("demo").unwrap();

        let action = orch
            .submit("demo", OperationKind::Destroy, SubmitParams::default())
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Failed);
        let msg = done.error.unwrap();
        assert!(msg.contains("did not finish"), "unexpected error: {msg}");
        assert!(!msg.contains("exited with code"), "timeout misreported: {msg}");
    }

    #[tokio::test]
    async fn import_without_command_is_rejected_synchronously() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);

        let err = orch
            .submit("demo", OperationKind::Import, SubmitParams::default())
            .unwrap_err();
        assert!(matches!(err, TfgateError::InvalidImportCommand(_)));
        assert!(orch.store().find_by_kind(OperationKind::Import).unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_import_appends_novel_resource() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);
        orch.create_config("demo").unwrap();

        let shared = json!({
            "name": "web", "type": "ibm_is_instance",
            "attributes": {"profile": "bx2-2x8"}
        });
        let target = json!({
            "version": 4, "serial": 7, "lineage": "target",
            "resources": [shared]
        });
        std::fs::write(
            paths::state_file(orch.root(), "demo"),
            serde_json::to_vec(&target).unwrap(),
        )
        .unwrap();

        // The terraformer stub does nothing; pre-seed what it would have
        // discovered. The stub's cleanup wipes the discovery dir first,
        // so the stub itself writes the snapshot.
        let discovered = json!({
            "version": 4, "serial": 1, "lineage": "discovery",
            "resources": [
                {"name": "instance-0", "type": "ibm_is_instance",
                 "attributes": {"profile": "bx2-2x8"}},
                {"name": "vpc-0", "type": "ibm_is_vpc",
                 "attributes": {"cidr": "10.0.0.0/16"}}
            ]
        });
        let orch_dir = orch.root().join("discovery").join(paths::STATE_FILE);
        let stub = format!(
            "mkdir -p {d} && cat > {f} <<'EOF'\n{json}\nEOF",
            d = orch.root().join("discovery").display(),
            f = orch_dir.display(),
            json = serde_json::to_string_pretty(&discovered).unwrap(),
        );
        let terraformer = install_stub(dir.path(), "terraformer2", &stub);

        // Rebuild the orchestrator with the snapshot-writing stub
        let config = TfgateConfig {
            data_dir: orch.root().clone(),
            terraform_bin: "true".into(),
            terraformer_bin: terraformer,
            operation_timeout_secs: 10,
            ..TfgateConfig::default()
        };
        let orch = Arc::new(
            Orchestrator::new(&config, Arc::clone(orch.store()), Arc::new(NoopNotifier)).unwrap(),
        );

        let action = orch
            .submit(
                "demo",
                OperationKind::Import,
                SubmitParams {
                    import_command: Some(ImportCommand::Merge),
                    services: vec!["vpc".into()],
                    ..SubmitParams::default()
                },
            )
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Completed, "error: {:?}", done.error);

        // One identical (ignoring name) + one novel: N resources became N+1
        let merged = StateSnapshot::read(&paths::state_file(orch.root(), "demo")).unwrap();
        assert_eq!(merged.resources.len(), 2);
        assert_eq!(merged.serial, 8);

        // Backup preserved the pre-merge snapshot
        let backup =
            StateSnapshot::read(&io::backup_path(&paths::state_file(orch.root(), "demo"))).unwrap();
        assert_eq!(backup.serial, 7);
        assert_eq!(backup.resources.len(), 1);
    }

    #[tokio::test]
    async fn merge_import_skips_equivalent_snapshots() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);
        orch.create_config("demo").unwrap();

        let target = json!({
            "version": 4, "serial": 7, "lineage": "target",
            "resources": [
                {"name": "web", "type": "ibm_is_instance",
                 "attributes": {"profile": "bx2-2x8"}},
                {"name": "db", "type": "ibm_is_volume",
                 "attributes": {"capacity": 100}}
            ]
        });
        let target_path = paths::state_file(orch.root(), "demo");
        std::fs::write(&target_path, serde_json::to_vec(&target).unwrap()).unwrap();
        let before = std::fs::read(&target_path).unwrap();

        // The same multiset under different names and ordering
        let discovered = json!({
            "version": 4, "serial": 1, "lineage": "discovery",
            "resources": [
                {"name": "volume-0", "type": "ibm_is_volume",
                 "attributes": {"capacity": 100}},
                {"name": "instance-0", "type": "ibm_is_instance",
                 "attributes": {"profile": "bx2-2x8"}}
            ]
        });
        let discovery_state = orch.root().join("discovery").join(paths::STATE_FILE);
        let stub = format!(
            "mkdir -p {d} && cat > {f} <<'EOF'\n{json}\nEOF",
            d = orch.root().join("discovery").display(),
            f = discovery_state.display(),
            json = serde_json::to_string_pretty(&discovered).unwrap(),
        );
        let terraformer = install_stub(dir.path(), "terraformer3", &stub);

        let config = TfgateConfig {
            data_dir: orch.root().clone(),
            terraform_bin: "true".into(),
            terraformer_bin: terraformer,
            operation_timeout_secs: 10,
            ..TfgateConfig::default()
        };
        let orch = Arc::new(
            Orchestrator::new(&config, Arc::clone(orch.store()), Arc::new(NoopNotifier)).unwrap(),
        );

        let action = orch
            .submit(
                "demo",
                OperationKind::Import,
                SubmitParams {
                    import_command: Some(ImportCommand::Merge),
                    ..SubmitParams::default()
                },
            )
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Completed, "error: {:?}", done.error);

        // Equivalent snapshots: the target is untouched byte-for-byte,
        // its serial stays put, and no backup was written.
        assert_eq!(std::fs::read(&target_path).unwrap(), before);
        assert_eq!(StateSnapshot::read(&target_path).unwrap().serial, 7);
        assert!(!io::backup_path(&target_path).exists());
    }

    #[tokio::test]
    async fn statefile_restores_from_backup() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);
        orch.create_config("terraformer").unwrap();

        let srv_dir = orch
            .root()
            .join("terraformer")
            .join("generated")
            .join("ibm")
            .join("vpc");
        std::fs::create_dir_all(&srv_dir).unwrap();
        std::fs::write(srv_dir.join("terraform.tfstate"), b"clobbered").unwrap();
        std::fs::write(srv_dir.join("terraform.tfstate_backup"), b"pristine").unwrap();

        let action = orch
            .submit(
                "terraformer",
                OperationKind::Statefile,
                SubmitParams {
                    services: vec!["vpc".into()],
                    ..SubmitParams::default()
                },
            )
            .unwrap();
        let done = wait_terminal(&orch, &action.id).await;
        assert_eq!(done.status, ActionStatus::Completed);
        assert_eq!(
            std::fs::read_to_string(srv_dir.join("terraform.tfstate")).unwrap(),
            "pristine"
        );
    }

    #[tokio::test]
    async fn delete_config_removes_dir_and_rejects_unknown() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator_with(&dir, "exit 0", 10);
        orch.create_config("demo").unwrap();

        orch.delete_config("demo").unwrap();
        assert!(!orch.root().join("demo").exists());

        let err = orch.delete_config("demo").unwrap_err();
        assert!(matches!(err, TfgateError::ConfigNotFound(_)));
    }
}
