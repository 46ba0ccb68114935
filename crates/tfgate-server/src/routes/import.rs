use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use tfgate_core::action::OperationKind;
use tfgate_core::orchestrator::{ImportCommand, SubmitParams};

use crate::error::AppError;
use crate::routes::actions;
use crate::state::AppState;

fn split_services(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub command: String,
    #[serde(default)]
    pub services: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

/// POST /v2/configuration/{config}/import?command=default|merge
///
/// Kicks off a discovery import. `command=merge` additionally reconciles
/// the discovered snapshot into the configuration's snapshot. An
/// unsupported command is rejected here, synchronously — no action is
/// created.
pub async fn import(
    State(app): State<AppState>,
    Path(config): Path<String>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let command = ImportCommand::from_str(&query.command)?;
    let params = SubmitParams {
        webhook_url: headers
            .get(actions::WEBHOOK_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        import_command: Some(command),
        services: split_services(query.services.as_deref()),
        tags: query.tags,
    };
    let action = app.orchestrator.submit(&config, OperationKind::Import, params)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "config_name": action.config_name,
            "action": action.kind.as_str(),
            "action_id": action.id,
            "status": action.status.as_str(),
            "timestamp": action.created_at.to_rfc3339(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatefileQuery {
    #[serde(default)]
    pub services: Option<String>,
}

/// POST /v2/configuration/{config}/statefile?services=a,b — restore each
/// service's snapshot from its backup.
pub async fn restore_statefile(
    State(app): State<AppState>,
    Path(config): Path<String>,
    Query(query): Query<StatefileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = SubmitParams {
        services: split_services(query.services.as_deref()),
        ..SubmitParams::default()
    };
    let action = app
        .orchestrator
        .submit(&config, OperationKind::Statefile, params)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "config_name": action.config_name,
            "action": action.kind.as_str(),
            "action_id": action.id,
            "status": action.status.as_str(),
            "timestamp": action.created_at.to_rfc3339(),
        })),
    ))
}
