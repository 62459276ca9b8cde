use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kanban_core::KanbanError;
use serde_json::json;
use tracing::{error, warn};

/// A [`KanbanError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub KanbanError);

impl ApiError {
    /// HTTP status for the wrapped error kind.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            KanbanError::NotFound(_) => StatusCode::NOT_FOUND,
            KanbanError::Validation(_) => StatusCode::BAD_REQUEST,
            KanbanError::InvalidTransition(_) | KanbanError::AlreadyRunning(_) => {
                StatusCode::CONFLICT
            }
            KanbanError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            KanbanError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KanbanError::Tracker(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<KanbanError> for ApiError {
    fn from(err: KanbanError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "Request rejected");
        }
        let body = json!({
            "success": false,
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Handler result.
pub type ApiResult<T> = Result<T, ApiError>;
