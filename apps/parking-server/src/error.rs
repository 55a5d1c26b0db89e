//! Server error types.

use auth::AuthError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parking_store::StoreError;
use serde_json::json;

use crate::validation::ValidationErrors;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Field-level validation failures.
    #[error("Invalid request data: {0}")]
    Validation(ValidationErrors),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with the resource's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication required.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Username or password did not match.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Authentication error.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

fn internal(error: &ServerError) -> Response {
    tracing::error!(error = %error, "Request failed");
    message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "Invalid request data",
                    "errors": errors,
                })),
            )
                .into_response(),
            ServerError::InvalidRequest(msg) => message(StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => message(StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Conflict(msg) => message(StatusCode::CONFLICT, msg.clone()),
            ServerError::AuthenticationRequired => {
                message(StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            ServerError::InvalidCredentials => {
                message(StatusCode::UNAUTHORIZED, "Invalid credentials")
            }
            ServerError::Store(StoreError::NotFound { entity_type, .. }) => {
                message(StatusCode::NOT_FOUND, capitalize(&format!("{entity_type} not found")))
            }
            ServerError::Store(StoreError::AlreadyExists { entity_type, .. }) => {
                let msg = match *entity_type {
                    "user" => "Username already exists".to_string(),
                    other => capitalize(&format!("{other} already exists")),
                };
                message(StatusCode::BAD_REQUEST, msg)
            }
            ServerError::Auth(
                AuthError::InvalidState(_)
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::Jwt(_),
            ) => {
                tracing::warn!(error = %self, "Authentication rejected");
                message(StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            ServerError::Store(_) | ServerError::Auth(_) => internal(&self),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::Validation(ValidationErrors::new()), StatusCode::BAD_REQUEST),
            (ServerError::Conflict("busy".into()), StatusCode::CONFLICT),
            (ServerError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (
                StoreError::not_found("parking space", "9").into(),
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::already_exists("user", "op").into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                StoreError::corrupt("parking space", "bad status").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AuthError::InvalidToken.into(), StatusCode::UNAUTHORIZED),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("parking space not found"), "Parking space not found");
        assert_eq!(capitalize(""), "");
    }
}
