use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use syncdeck_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Core(CoreError::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Core(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Core(CoreError::Permission(_)) => StatusCode::FORBIDDEN,
            Self::Core(CoreError::Daemon(_) | CoreError::Preseed(_)) => StatusCode::BAD_GATEWAY,
            Self::Core(CoreError::DaemonUnreachable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Core(CoreError::DaemonTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Request failed: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
