use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Errors surfaced by the session and webhook core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("That email is already registered")]
    AlreadyRegistered,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Missing stripe-signature header")]
    MissingSignature,

    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("Invalid webhook payload")]
    InvalidPayload,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AlreadyRegistered => (StatusCode::CONFLICT, "already_registered"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::MissingSignature => (StatusCode::BAD_REQUEST, "missing_signature"),
            AppError::SignatureInvalid => (StatusCode::BAD_REQUEST, "signature_invalid"),
            AppError::InvalidPayload => (StatusCode::BAD_REQUEST, "invalid_payload"),
            AppError::Hashing(_) | AppError::Store(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Hashing(_) | AppError::Store(_) | AppError::Internal(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "database error");
        AppError::Store(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Infrastructure detail stays in the server log.
        let message = if self.is_internal() {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
