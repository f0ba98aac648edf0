//! Error types for relink

use thiserror::Error;

/// Core error type for relink operations.
///
/// Drivers report every failure through the `Connection`, `Query` or `Driver`
/// variants with the driver's own message. Those are the only variants the
/// reconnect machinery ever inspects; everything else is surfaced as-is.
#[derive(Error, Debug)]
pub enum RelinkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    /// A reconnect would have happened inside an open transaction.
    ///
    /// The uncommitted work is gone with the old connection, so the caller
    /// has to replay the whole transaction. `source` is the driver error that
    /// triggered the reconnect.
    #[error("Connection lost during transaction: {source}")]
    TransactionLost {
        #[source]
        source: Box<RelinkError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Statement cache conflict: fingerprint {fingerprint} is bound to another statement")]
    CacheConflict { fingerprint: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelinkError {
    /// Wrap a driver error that was raised while a transaction was open.
    pub fn transaction_lost(cause: RelinkError) -> Self {
        RelinkError::TransactionLost {
            source: Box::new(cause),
        }
    }

    /// The raw driver message, if this is a driver-level error.
    ///
    /// Returns the message without the variant prefix added by `Display`, so
    /// pattern matching sees exactly what the driver reported.
    pub fn driver_message(&self) -> Option<&str> {
        match self {
            RelinkError::Connection(msg) | RelinkError::Query(msg) | RelinkError::Driver(msg) => {
                Some(msg)
            }
            _ => None,
        }
    }

    /// Whether this is the transaction-integrity error.
    pub fn is_transaction_lost(&self) -> bool {
        matches!(self, RelinkError::TransactionLost { .. })
    }
}

/// Result type alias for relink operations
pub type Result<T> = std::result::Result<T, RelinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_driver_message_strips_prefix() {
        let err = RelinkError::Connection("MySQL server has gone away".into());
        assert_eq!(err.driver_message(), Some("MySQL server has gone away"));
        assert_eq!(err.to_string(), "Connection error: MySQL server has gone away");

        let err = RelinkError::Query("syntax error near FROM".into());
        assert_eq!(err.driver_message(), Some("syntax error near FROM"));
    }

    #[test]
    fn test_non_driver_errors_have_no_message() {
        assert!(RelinkError::Configuration("missing dsn".into()).driver_message().is_none());
        assert!(RelinkError::NotFound("primary".into()).driver_message().is_none());
        let lost = RelinkError::transaction_lost(RelinkError::Connection("gone".into()));
        assert!(lost.driver_message().is_none());
    }

    #[test]
    fn test_transaction_lost_keeps_cause() {
        let lost = RelinkError::transaction_lost(RelinkError::Connection(
            "Lost connection to MySQL server during query".into(),
        ));
        assert!(lost.is_transaction_lost());
        assert!(lost.to_string().contains("Lost connection to MySQL server"));

        let source = lost.source().expect("transaction lost error carries a source");
        assert!(source.to_string().starts_with("Connection error:"));
    }
}
