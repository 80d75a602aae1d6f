use thiserror::Error;

/// Errors returned by the data-access layer. Each variant carries the
/// driver's message verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataAccessError {
    #[error("{0}")]
    ConnectionFailed(String),
    #[error("{0}")]
    ExecutionFailed(String),
    #[error("{0}")]
    FetchFailed(String),
}

impl DataAccessError {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DataAccessError::ConnectionFailed(_) => "connection_failed",
            DataAccessError::ExecutionFailed(_) => "execution_failed",
            DataAccessError::FetchFailed(_) => "fetch_failed",
        }
    }

    /// Classifies an error raised while streaming rows. Driver-reported
    /// statement errors and anything before the first row count as execution
    /// failures; decode problems and errors after rows were received count as
    /// fetch failures.
    pub(crate) fn from_stream(err: sqlx::Error, rows_seen: bool) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. } => DataAccessError::FetchFailed(err.to_string()),
            sqlx::Error::Database(_) => DataAccessError::ExecutionFailed(err.to_string()),
            other if rows_seen => DataAccessError::FetchFailed(other.to_string()),
            other => DataAccessError::ExecutionFailed(other.to_string()),
        }
    }
}
