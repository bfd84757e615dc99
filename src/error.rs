use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    DatabaseError(String),
    NotFound(String),
    Internal(String),
    /// Raised by lifecycle hooks and API payload checks
    Validation(String),
    /// A query option set that cannot be turned into SQL (bad type, unknown subtype, non-integer guid)
    InvalidQuery(String),
    /// A required lifecycle argument is missing or malformed
    InvalidParameter(String),
    /// A stored row carries a type outside object/user/group/site
    UnsupportedType(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    Forbidden(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidQuery(_) | AppError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::UnsupportedType(_)
            | AppError::ConfigurationError(_)
            | AppError::SerializationError(_)
            | AppError::DeserializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            AppError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            AppError::UnsupportedType(msg) => write!(f, "Entity type not supported: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures are logged in full and reported generically
        let error_message = if status.is_server_error() {
            tracing::error!("{}", self);
            "Internal server error".to_string()
        } else {
            match self {
                AppError::NotFound(msg)
                | AppError::Validation(msg)
                | AppError::InvalidQuery(msg)
                | AppError::InvalidParameter(msg)
                | AppError::Forbidden(msg) => msg,
                other => other.to_string(),
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
