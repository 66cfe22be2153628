// Error taxonomy shared by ingestion, analytics and the store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures raised by the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// At least one record in an unordered bulk write failed for a reason
    /// other than a duplicate identity hash.
    #[error("bulk write failed: {rejected} record(s) rejected, first failure at index {index}: {message}")]
    BulkWrite {
        rejected: usize,
        index: usize,
        message: String,
    },

    #[error("invalid aggregation pipeline: {0}")]
    InvalidPipeline(String),

    /// A persisted row could not be interpreted (bad clock time, missing group key...)
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

/// Coarse classification used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientInput,
    Authorization,
    NotFound,
    Service,
}

impl ErrorClass {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorClass::ClientInput => 400,
            ErrorClass::Authorization => 401,
            ErrorClass::NotFound => 404,
            ErrorClass::Service => 500,
        }
    }
}

/// Errors returned by every ingestion and analytics entry point.
///
/// All of them are terminal for the request; nothing here is retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed query or body parameter (year, month, page, limit, dates...)
    #[error("{0}")]
    ClientInput(String),

    /// Missing or invalid owner identity
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn client_input(message: impl Into<String>) -> Self {
        ServiceError::ClientInput(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::ClientInput(_) => ErrorClass::ClientInput,
            ServiceError::Unauthorized(_) => ErrorClass::Authorization,
            ServiceError::NotFound(_) => ErrorClass::NotFound,
            ServiceError::Store(_) | ServiceError::Internal(_) => ErrorClass::Service,
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        tracing::error!("an unhandled SQL error occurred: {}", value);
        ServiceError::Store(StoreError::Sqlite(value))
    }
}
