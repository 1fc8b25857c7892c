use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Request-boundary error. Every domain error is caught here and serialized
/// as `{success: false, message, error}`; nothing crosses silently.
#[derive(Debug)]
pub enum AppError {
    Domain(souq_core::Error),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::Domain(err) => {
                if err.status_code() >= 500 {
                    tracing::error!("Internal Server Error: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "Internal Server Error".to_string(),
                    )
                } else {
                    let status = StatusCode::from_u16(err.status_code())
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    (status, err.kind(), err.to_string())
                }
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "error": kind,
        }));

        (status, body).into_response()
    }
}

impl From<souq_core::Error> for AppError {
    fn from(err: souq_core::Error) -> Self {
        Self::Domain(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
