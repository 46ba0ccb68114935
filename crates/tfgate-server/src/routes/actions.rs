use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use tfgate_core::action::{Action, OperationKind};
use tfgate_core::logs::LogArtifact;
use tfgate_core::orchestrator::SubmitParams;
use tfgate_core::TfgateError;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's notification webhook.
pub const WEBHOOK_HEADER: &str = "x-webhook-url";

fn webhook_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(WEBHOOK_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn action_json(action: &Action) -> serde_json::Value {
    serde_json::json!({
        "config_name": action.config_name,
        "action": action.kind.as_str(),
        "action_id": action.id,
        "status": action.status.as_str(),
        "timestamp": action.created_at.to_rfc3339(),
    })
}

/// POST /v1/configuration/{config}/{operation} — submit plan, apply,
/// destroy, or show. Returns 202 with the in-progress action record;
/// import and statefile have their own v2 routes.
pub async fn submit_operation(
    State(app): State<AppState>,
    Path((config, operation)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let kind = OperationKind::from_str(&operation)?;
    if !kind.requires_config_dir() {
        return Err(AppError(
            TfgateError::InvalidOperation(format!("'{operation}' is not submittable here")).into(),
        ));
    }

    let params = SubmitParams {
        webhook_url: webhook_from(&headers),
        ..SubmitParams::default()
    };
    let action = app.orchestrator.submit(&config, kind, params)?;
    Ok((StatusCode::ACCEPTED, Json(action_json(&action))))
}

/// GET /v1/configuration/{config}/{operation}/{id}/status
pub async fn get_status(
    State(app): State<AppState>,
    Path((_config, _operation, id)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action = app.orchestrator.store().find(&id)?;
    Ok(Json(serde_json::json!({
        "status": action.status.as_str(),
        "error": action.error,
    })))
}

/// GET /v1/configuration/{config}/{operation}/{id}/log — both artifacts.
pub async fn get_log(
    State(app): State<AppState>,
    Path((config, operation, id)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let log = LogArtifact::read(&app.orchestrator.log_dir(), &id).await?;
    Ok(Json(serde_json::json!({
        "config_name": config,
        "action": operation,
        "action_id": id,
        "output": log.stdout,
        "error": log.stderr,
    })))
}

/// GET /v1/configuration/{config}/{operation} — all actions of a kind,
/// newest first.
pub async fn list_actions(
    State(app): State<AppState>,
    Path((_config, operation)): Path<(String, String)>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let kind = OperationKind::from_str(&operation)?;
    let actions = app.orchestrator.store().find_by_kind(kind)?;
    Ok(Json(actions.iter().map(action_json).collect()))
}

/// GET /v1/logs/{file} — raw bytes of one artifact file.
pub async fn view_log(
    State(app): State<AppState>,
    Path(file): Path<String>,
) -> Result<Vec<u8>, AppError> {
    // Artifact names are `<20 hex>.out` / `<20 hex>.err`; anything else
    // (in particular path separators) is rejected.
    let valid = file
        .strip_suffix(".out")
        .or_else(|| file.strip_suffix(".err"))
        .is_some_and(|stem| stem.len() == 20 && stem.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(AppError(TfgateError::LogNotFound(file).into()));
    }
    let path = app.orchestrator.log_dir().join(&file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError(TfgateError::LogNotFound(file).into()))?;
    Ok(bytes)
}
