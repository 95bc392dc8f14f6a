use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use crate::errors::AuditError;

impl AuditError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuditError::Config(_) | AuditError::InvalidTarget(_) | AuditError::Json(_) | AuditError::Yaml(_) => {
                StatusCode::BAD_REQUEST
            }
            AuditError::NotFound(_) => StatusCode::NOT_FOUND,
            AuditError::InvalidState(_) | AuditError::Cancelled(_) => StatusCode::CONFLICT,
            AuditError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AuditError::Browser(_) | AuditError::Navigation(_) | AuditError::Network(_) | AuditError::Figma(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuditError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuditError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
