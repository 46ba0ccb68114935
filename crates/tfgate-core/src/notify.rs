//! Fire-and-forget status notifications.
//!
//! The orchestrator posts a human-readable note (with the log artifact
//! locations) to a caller-supplied webhook once at admission and once at
//! the terminal transition. Delivery is best-effort: a failed or slow
//! webhook must never fail or delay the action, so the webhook notifier
//! hands the POST to a detached task and logs failures at warn.

use serde::Serialize;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// StatusNote
// ---------------------------------------------------------------------------

/// One status message about an action.
#[derive(Debug, Clone, Serialize)]
pub struct StatusNote {
    pub config_name: String,
    pub operation: String,
    pub action_id: String,
    pub status: String,
    /// Where the stdout/stderr artifacts can be fetched.
    pub stdout_url: String,
    pub stderr_url: String,
}

impl StatusNote {
    /// The human-readable text delivered to the webhook.
    pub fn text(&self) -> String {
        format!(
            "{} {} for '{}' is {} — stdout: {} stderr: {}",
            self.operation, self.action_id, self.config_name, self.status, self.stdout_url,
            self.stderr_url
        )
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// External notification sink. `notify` must not block the caller and
/// must swallow delivery failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, webhook_url: Option<&str>, note: &StatusNote);
}

/// Posts `{"text": ...}` to the webhook, Slack-style, from a detached task.
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, webhook_url: Option<&str>, note: &StatusNote) {
        let Some(url) = webhook_url else {
            debug!(action_id = %note.action_id, "no webhook configured, skipping notification");
            return;
        };
        let client = self.client.clone();
        let url = url.to_string();
        let body = serde_json::json!({ "text": note.text() });
        let action_id = note.action_id.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(action_id, status = %resp.status(), "webhook rejected notification");
                }
                Ok(_) => {}
                Err(e) => warn!(action_id, "webhook delivery failed: {e}"),
            }
        });
    }
}

/// Discards every note. Used in tests and when notifications are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _webhook_url: Option<&str>, _note: &StatusNote) {}
}
