use crate::database::DatabaseError;
use crate::lifecycle::Operation;
use crate::models::VoteStatus;
use crate::odds::OddsError;
use sqlx::Error as SqlxError;
use thiserror::Error;
use uuid::Uuid;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// The vote's lifecycle status forbids the operation
    #[error("Operation {operation} is not allowed while vote is {status}")]
    InvalidState {
        status: VoteStatus,
        operation: Operation,
    },

    /// User balance does not cover the requested stake
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller does not own the resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Cancelling a cancelled bet, settling a rewarded vote
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// Participation policy forbids a second active bet
    #[error("User {user_id} already has an active bet on vote {vote_id}")]
    DuplicateParticipation { vote_id: Uuid, user_id: Uuid },

    /// Ledger data is inconsistent in a way that cannot be clamped
    #[error("Consistency anomaly: {0}")]
    ConsistencyAnomaly(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Odds/payout arithmetic errors
    #[error("Odds error: {0}")]
    Odds(#[from] OddsError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, AppError::InvalidState { .. })
    }

    pub fn is_already_processed(&self) -> bool {
        matches!(self, AppError::AlreadyProcessed(_))
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::InvalidState { .. }
            | AppError::AlreadyProcessed(_)
            | AppError::DuplicateParticipation { .. } => 409,
            AppError::InsufficientBalance { .. } => 422,
            AppError::Config(_) => 500,
            AppError::Database(_) | AppError::Sqlx(_) => 500,
            _ => 500,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored value cannot be decoded into a domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::AlreadyProcessed(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::Corrupt(msg) => AppError::ConsistencyAnomaly(msg),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // unique violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // foreign key / check violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}
