use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<fleet_store::RepositoryError> for ApiError {
    fn from(e: fleet_store::RepositoryError) -> Self {
        match e {
            fleet_store::RepositoryError::NotFound { .. } => ApiError::not_found(e.to_string()),
            fleet_store::RepositoryError::Domain(_) | fleet_store::RepositoryError::InvalidFilter(_) => {
                ApiError::bad_request(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<fleet_store::ConnectionError> for ApiError {
    fn from(e: fleet_store::ConnectionError) -> Self {
        ApiError::internal(e.to_string())
    }
}
