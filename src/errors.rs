//! Error types for the connection pool

use thiserror::Error;

/// Boxed error produced by a connection factory or by closing a connection
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    /// Construction parameters were rejected before any connection was created
    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("Pool is closed")]
    Closed,

    /// The factory could not produce a connection; the factory's error is the source
    #[error("Failed to create connection")]
    Create(#[source] BoxError),

    /// The idle set was at capacity, so the released connection was closed
    #[error("Pool is full - connection closed instead of retained")]
    PoolFull,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

impl PoolError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        PoolError::Config(reason.into())
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_create_keeps_factory_error_as_source() {
        let err = PoolError::Create("connection refused".into());
        assert_eq!(err.to_string(), "Failed to create connection");
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }

    #[test]
    fn test_config_message() {
        let err = PoolError::config("capacity must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid pool configuration: capacity must be greater than zero"
        );
    }
}
