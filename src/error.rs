use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    Unauthorized,
    NotFound,
    HttpTimeout,
    RateLimited,
    InvalidRequest,
    InvalidResponse,
    BackendUnavailable,
    Unknown,
}

impl ApiErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorCode::Unauthorized => "UNAUTHORIZED",
            ApiErrorCode::NotFound => "NOT_FOUND",
            ApiErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ApiErrorCode::RateLimited => "RATE_LIMITED",
            ApiErrorCode::InvalidRequest => "INVALID_REQUEST",
            ApiErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ApiErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ApiErrorCode::Unknown => "UNKNOWN_API_ERROR",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a reschedule failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleStage {
    CreateReplacement,
    DeleteOriginal,
    /// The original could not be deleted and neither could the replacement,
    /// so both events are on the calendar.
    RollbackReplacement,
}

impl RescheduleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RescheduleStage::CreateReplacement => "create_replacement",
            RescheduleStage::DeleteOriginal => "delete_original",
            RescheduleStage::RollbackReplacement => "rollback_replacement",
        }
    }
}

impl fmt::Display for RescheduleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Api {
        code: ApiErrorCode,
        message: String,
        status: Option<u16>,
        details: Option<JsonValue>,
    },

    #[error("reschedule failed during {stage}: {message}")]
    Reschedule {
        stage: RescheduleStage,
        message: String,
        replacement_id: Option<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn api(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self::api_with_details(code, message, None, None)
    }

    pub fn api_with_details(
        code: ApiErrorCode,
        message: impl Into<String>,
        status: Option<u16>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        match (status, &details) {
            (Some(status), Some(payload)) => {
                warn!(target: "app::api::error", code = %code, status, details = %payload, %message);
            }
            (Some(status), None) => {
                warn!(target: "app::api::error", code = %code, status, %message);
            }
            (None, Some(payload)) => {
                warn!(target: "app::api::error", code = %code, details = %payload, %message);
            }
            (None, None) => {
                warn!(target: "app::api::error", code = %code, %message);
            }
        }

        AppError::Api {
            code,
            message,
            status,
            details,
        }
    }

    pub fn api_code(&self) -> Option<ApiErrorCode> {
        match self {
            AppError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn reschedule(stage: RescheduleStage, message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::suggestions", stage = %stage, %message, "reschedule failed");
        AppError::Reschedule {
            stage,
            message,
            replacement_id: None,
        }
    }

    /// Reschedule failure that left the replacement event behind.
    pub fn reschedule_left_replacement(
        message: impl Into<String>,
        replacement_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let replacement_id = replacement_id.into();
        error!(
            target: "app::suggestions",
            %message,
            %replacement_id,
            "reschedule left a duplicate event"
        );
        AppError::Reschedule {
            stage: RescheduleStage::RollbackReplacement,
            message,
            replacement_id: Some(replacement_id),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("unique or constraint violation")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
