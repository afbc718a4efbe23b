use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Insufficient storage: requested {requested} bytes, {available} bytes available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Migration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                json!({ "error": "Database error", "status": status.as_u16() })
            }
            AppError::Migration(ref e) => {
                tracing::error!("Migration error: {}", e);
                json!({ "error": "Database error", "status": status.as_u16() })
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::QuotaExceeded {
                requested,
                available,
            } => json!({
                "error": "Insufficient storage",
                "status": status.as_u16(),
                "requested": requested,
                "available": available,
            }),
            AppError::Validation(ref msg) => json!({ "error": msg, "status": status.as_u16() }),
            AppError::NotFound => json!({ "error": "Resource not found", "status": status.as_u16() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
