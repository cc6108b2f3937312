use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RewardEngineError>;

#[derive(Error, Debug)]
pub enum RewardEngineError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(uuid::Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("User not found: {0}")]
    UserNotFound(uuid::Uuid),

    #[error("User not found for code: {0}")]
    UserCodeNotFound(String),

    #[error("Submission {submission_id} already reviewed: {status}")]
    InvalidState {
        submission_id: uuid::Uuid,
        status: String,
    },

    #[error("Pending submission already exists for task {task_id} by user {user_id}")]
    DuplicateSubmission {
        task_id: uuid::Uuid,
        user_id: uuid::Uuid,
    },

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Invalid username or password")]
    Unauthorized,

    #[error("User is blocked")]
    UserBlocked,

    #[error("Conflict, retry the operation: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// Retryable contention surfaces as Conflict instead of a plain database
// error: serialization failure (40001), deadlock (40P01), lock not
// available (55P03), and pool acquire timeouts.
impl From<sqlx::Error> for RewardEngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    if matches!(code.as_ref(), "40001" | "40P01" | "55P03") {
                        return RewardEngineError::Conflict(db_err.message().to_string());
                    }
                }
                RewardEngineError::Database(err)
            }
            sqlx::Error::PoolTimedOut => {
                RewardEngineError::Conflict("connection pool exhausted".to_string())
            }
            _ => RewardEngineError::Database(err),
        }
    }
}

impl ResponseError for RewardEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RewardEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RewardEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            RewardEngineError::SubmissionNotFound(_) => StatusCode::NOT_FOUND,
            RewardEngineError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            RewardEngineError::UserNotFound(_) => StatusCode::NOT_FOUND,
            RewardEngineError::UserCodeNotFound(_) => StatusCode::NOT_FOUND,
            RewardEngineError::InvalidState { .. } => StatusCode::CONFLICT,
            RewardEngineError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
            RewardEngineError::UsernameTaken(_) => StatusCode::CONFLICT,
            RewardEngineError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            RewardEngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            RewardEngineError::UserBlocked => StatusCode::FORBIDDEN,
            RewardEngineError::Conflict(_) => StatusCode::CONFLICT,
            RewardEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl RewardEngineError {
    fn error_type(&self) -> &str {
        match self {
            RewardEngineError::Database(_) => "database_error",
            RewardEngineError::Validation(_) => "validation_error",
            RewardEngineError::SubmissionNotFound(_) => "not_found",
            RewardEngineError::TaskNotFound(_) => "not_found",
            RewardEngineError::UserNotFound(_) => "not_found",
            RewardEngineError::UserCodeNotFound(_) => "not_found",
            RewardEngineError::InvalidState { .. } => "invalid_state",
            RewardEngineError::DuplicateSubmission { .. } => "duplicate_error",
            RewardEngineError::UsernameTaken(_) => "duplicate_error",
            RewardEngineError::InsufficientBalance { .. } => "insufficient_balance",
            RewardEngineError::Unauthorized => "unauthorized",
            RewardEngineError::UserBlocked => "unauthorized",
            RewardEngineError::Conflict(_) => "conflict",
            RewardEngineError::Internal(_) => "internal_error",
        }
    }
}
