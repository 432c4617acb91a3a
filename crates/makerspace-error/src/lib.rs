// Makerspace Error Handling
// Local failure types for the transaction cache crates

use std::fmt;
use thiserror::Error;

// Re-export so downstream crates derive against the same version
pub use thiserror;

mod conversion;
mod macros;

pub use conversion::{config_error, key_error, IntoTransactionError};

/// Error domains representing the parts of the cache that can fail locally.
/// Remote operation failures are not errors here, they become entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorDomain {
    Key, Config, Telemetry, External,
}
impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Key => write!(f, "key"),
            ErrorDomain::Config => write!(f, "config"),
            ErrorDomain::Telemetry => write!(f, "telemetry"),
            ErrorDomain::External => write!(f, "external"),
        }
    }
}

/// Error type for everything the cache can get wrong on its own
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Cannot derive cache key for {operation}: {reason}")]
    KeyDerivation { operation: String, reason: String },
    #[error("Invalid configuration: {0}")] Config(String),
    #[error("IO error: {0}")] Io(#[from] std::io::Error),
    #[error("Tracing setup failed: {0}")] Tracing(String),
    #[error("Serialization error: {0}")] Serialization(String),
}

impl TransactionError {
    /// Returns a unique static string code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            TransactionError::KeyDerivation { .. } => "KEY_DERIVATION",
            TransactionError::Config(_) => "CONFIG_INVALID",
            TransactionError::Io(_) => "EXTERNAL_IO",
            TransactionError::Tracing(_) => "TELEMETRY_INIT",
            TransactionError::Serialization(_) => "EXTERNAL_SERDE",
        }
    }

    /// The domain this error belongs to
    pub fn domain(&self) -> ErrorDomain {
        match self {
            TransactionError::KeyDerivation { .. } => ErrorDomain::Key,
            TransactionError::Config(_) => ErrorDomain::Config,
            TransactionError::Tracing(_) => ErrorDomain::Telemetry,
            TransactionError::Io(_) | TransactionError::Serialization(_) => ErrorDomain::External,
        }
    }
}

/// Standard result type for local cache failures
pub type TransactionResult<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_domains() {
        let err = key_error("listMembers", "not an object");
        assert_eq!(err.error_code(), "KEY_DERIVATION");
        assert_eq!(err.domain(), ErrorDomain::Key);
        assert_eq!(
            err.to_string(),
            "Cannot derive cache key for listMembers: not an object"
        );

        let err = config_error("notify_capacity must be positive");
        assert_eq!(err.domain(), ErrorDomain::Config);
        assert_eq!(err.domain().to_string(), "config");
    }

    #[test]
    fn test_every_domain_has_a_variant() {
        let errors = [
            key_error("getInvoice", "bad args"),
            config_error("empty level"),
            TransactionError::Tracing("already installed".into()),
            TransactionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "missing file",
            )),
        ];
        let domains: Vec<ErrorDomain> = errors.iter().map(TransactionError::domain).collect();
        assert_eq!(
            domains,
            vec![
                ErrorDomain::Key,
                ErrorDomain::Config,
                ErrorDomain::Telemetry,
                ErrorDomain::External,
            ]
        );
    }

    #[test]
    fn test_serde_json_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err = parse.into_transaction_error().unwrap_err();
        assert_eq!(err.error_code(), "EXTERNAL_SERDE");
    }
}
