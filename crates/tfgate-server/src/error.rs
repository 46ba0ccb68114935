use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tfgate_core::TfgateError;

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(TfgateError::InvalidOperation(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if let Some(e) = self.0.downcast_ref::<TfgateError>() {
            match e {
                TfgateError::InvalidOperation(_)
                | TfgateError::InvalidConfigName(_)
                | TfgateError::InvalidImportCommand(_) => StatusCode::BAD_REQUEST,
                TfgateError::ConfigNotFound(_)
                | TfgateError::ActionNotFound(_)
                | TfgateError::LogNotFound(_) => StatusCode::NOT_FOUND,
                TfgateError::DuplicateAction(_) | TfgateError::AlreadyTerminal { .. } => {
                    StatusCode::CONFLICT
                }
                TfgateError::Exec(_)
                | TfgateError::ExecutionFailed(_)
                | TfgateError::ExecutionTimeout(_)
                | TfgateError::Reconcile(_)
                | TfgateError::ReconcileTimeout(_)
                | TfgateError::Store(_)
                | TfgateError::Io(_)
                | TfgateError::Yaml(_)
                | TfgateError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
