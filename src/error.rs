use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("product is currently available")]
    AlreadyAvailable,

    #[error("no email address on file")]
    MissingEmail,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidStatus(_) | AppError::MissingEmail => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::AlreadyAvailable => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Json(_)
            | AppError::LockPoisoned
            | AppError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Request bodies that fail to parse come back as field errors. For a type
/// mismatch the field is the JSON path axum reports (`items[0].qty`);
/// anything else is charged to `body`.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(_) => {
                let text = rejection.body_text();
                let detail = text.split_once(": ").map_or(text.as_str(), |(_, d)| d);
                match detail.split_once(": ") {
                    Some((path, reason)) if !path.is_empty() && !path.contains(' ') => {
                        AppError::field(path, reason)
                    }
                    _ => AppError::field("body", detail),
                }
            }
            JsonRejection::MissingJsonContentType(_) => {
                AppError::field("body", "expected an application/json request body")
            }
            other => AppError::field("body", other.body_text()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(fields) => ErrorBody {
                error: "validation failed".to_string(),
                fields,
            },
            AppError::Database(_)
            | AppError::Json(_)
            | AppError::LockPoisoned
            | AppError::Task(_) => {
                // Persistence detail stays in the log.
                error!(error = %self, "request failed on storage layer");
                ErrorBody {
                    error: "internal server error".to_string(),
                    fields: Vec::new(),
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                fields: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}
