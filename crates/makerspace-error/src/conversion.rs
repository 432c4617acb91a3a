// Error conversion utilities
// Turns foreign errors into TransactionError

use crate::TransactionError;

/// Trait for converting a foreign Result into a TransactionResult
pub trait IntoTransactionError<T> {
    /// Convert the error side into a TransactionError
    fn into_transaction_error(self) -> Result<T, TransactionError>;
}

impl<T> IntoTransactionError<T> for Result<T, serde_json::Error> {
    fn into_transaction_error(self) -> Result<T, TransactionError> {
        self.map_err(TransactionError::from)
    }
}

impl<T> IntoTransactionError<T> for Result<T, std::io::Error> {
    fn into_transaction_error(self) -> Result<T, TransactionError> {
        self.map_err(TransactionError::Io)
    }
}

impl From<serde_json::Error> for TransactionError {
    fn from(err: serde_json::Error) -> Self {
        TransactionError::Serialization(err.to_string())
    }
}

/// Create a key derivation error for the named operation
pub fn key_error(operation: impl Into<String>, reason: impl Into<String>) -> TransactionError {
    TransactionError::KeyDerivation {
        operation: operation.into(),
        reason: reason.into(),
    }
}

/// Create a configuration error with the given reason
pub fn config_error(reason: impl Into<String>) -> TransactionError {
    TransactionError::Config(reason.into())
}
