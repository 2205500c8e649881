//! Database error types

use thiserror::Error;

use rekber_types::EscrowError;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for EscrowError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => EscrowError::NotFound(what),
            DbError::Query(sqlx::Error::RowNotFound) => {
                EscrowError::NotFound("row".to_string())
            }
            DbError::Query(sqlx::Error::PoolTimedOut) => {
                EscrowError::Contention("database pool acquire timed out".to_string())
            }
            other => EscrowError::Store(other.to_string()),
        }
    }
}

/// Shorthand used inside the store: sqlx errors straight to the domain
/// taxonomy, keeping the pool-timeout path retryable.
pub(crate) fn sqlx_err(e: sqlx::Error) -> EscrowError {
    EscrowError::from(DbError::Query(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_retryable() {
        let err = sqlx_err(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = sqlx_err(sqlx::Error::RowNotFound);
        assert!(matches!(err, EscrowError::NotFound(_)));
    }
}
