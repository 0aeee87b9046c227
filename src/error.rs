use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by the pool manager and the transaction executor
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database configuration error: {0}")]
    Configuration(String),

    #[error("Failed to acquire database connection: {0}")]
    ConnectionAcquisition(#[source] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(#[from] sqlx::Error),
}

/// Application-specific errors with HTTP status code mappings
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DbError::Transaction(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(what) => {
                tracing::debug!("Not found: {}", what);
                (StatusCode::NOT_FOUND, what.as_str())
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.as_str())
            }
            AppError::Database(DbError::Configuration(msg)) => {
                tracing::error!("Database configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database is not configured",
                )
            }
            AppError::Database(DbError::ConnectionAcquisition(err)) => {
                tracing::error!("Database unavailable: {:?}", err);
                (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable")
            }
            AppError::Database(DbError::Transaction(err)) => {
                tracing::error!("Database error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}
