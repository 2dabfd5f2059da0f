use thiserror::Error;

/// Error taxonomy for the data-access layer.
///
/// Pool acquisition and statement execution failures are the caller's to
/// handle; `Cache` failures are absorbed at the facade boundary and only
/// exist here so facade internals can carry them before they are logged
/// and counted.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Connection pool not initialized: {0}")]
    PoolNotInitialized(String),

    #[error("Timed out acquiring a connection: {0}")]
    AcquireTimeout(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Cache operation failed: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, DataAccessError>;

impl DataAccessError {
    /// True when the error is an acquisition timeout rather than a
    /// statement failure. Used by the pool manager's failure counters.
    pub fn is_acquire_timeout(&self) -> bool {
        matches!(self, DataAccessError::AcquireTimeout(_))
    }
}

// Implement From for common error types
#[cfg(feature = "database")]
impl From<sqlx::Error> for DataAccessError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                DataAccessError::AcquireTimeout("pool wait elapsed".to_string())
            }
            other => DataAccessError::Execution(other.to_string()),
        }
    }
}

#[cfg(feature = "database")]
impl From<r2d2::Error> for DataAccessError {
    fn from(err: r2d2::Error) -> Self {
        DataAccessError::AcquireTimeout(err.to_string())
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for DataAccessError {
    fn from(err: redis::RedisError) -> Self {
        DataAccessError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for DataAccessError {
    fn from(err: serde_json::Error) -> Self {
        DataAccessError::Serialization(err.to_string())
    }
}
