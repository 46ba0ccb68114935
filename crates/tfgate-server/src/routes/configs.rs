use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use tfgate_core::paths::DISCOVERY_CONFIG;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CreateConfigRequest {
    #[serde(default)]
    pub config_name: Option<String>,
}

/// POST /v1/configuration — create a configuration directory. With no
/// name, the virtual `discovery` namespace is created instead. Cloning
/// a git repository into the directory is outside this service; a
/// directory populated by other means is accepted as-is.
pub async fn create_config(
    State(app): State<AppState>,
    Json(req): Json<CreateConfigRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = req
        .config_name
        .unwrap_or_else(|| DISCOVERY_CONFIG.to_string());
    app.orchestrator.create_config(&name)?;
    Ok(Json(serde_json::json!({ "config_name": name })))
}

/// DELETE /v1/configuration/{config}
pub async fn delete_config(
    State(app): State<AppState>,
    Path(config): Path<String>,
) -> Result<StatusCode, AppError> {
    app.orchestrator.delete_config(&config)?;
    Ok(StatusCode::NO_CONTENT)
}
