//! Error types for feedrelay.

use thiserror::Error;

/// Common error type for feedrelay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for input or payloads.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// HTTP fetch error.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Feed document or payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Delivery to a chat platform failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Message broker error.
    #[error("broker error: {0}")]
    Broker(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The owner already has as many feeds as their entitlement allows.
    #[error("feed limit reached: {0}")]
    FeedLimitReached(String),

    /// A retry was requested for a feed that is not in the failed state.
    #[error("feed {0} is not in the failed state")]
    FeedNotFailed(i64),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Parse(e.to_string())
    }
}

/// Result type alias for feedrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = RelayError::Validation("url is empty".to_string());
        assert_eq!(err.to_string(), "validation error: url is empty");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = RelayError::NotFound("feed".to_string());
        assert_eq!(err.to_string(), "feed not found");
    }

    #[test]
    fn test_feed_not_failed_display() {
        let err = RelayError::FeedNotFailed(42);
        assert_eq!(err.to_string(), "feed 42 is not in the failed state");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RelayError = json_err.into();
        assert!(matches!(err, RelayError::Parse(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(RelayError::Fetch("timed out".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
