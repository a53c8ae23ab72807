//! Error types for currency parsing and money conversion.

use thiserror::Error;

/// Errors raised while constructing or combining currency values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// Code is not exactly three ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCode(String),

    /// Amount text is not a decimal, or arithmetic on it overflowed.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl CurrencyError {
    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CurrencyError::InvalidCode(_) => "INVALID_CURRENCY",
            CurrencyError::InvalidAmount(_) => "INVALID_AMOUNT",
        }
    }
}

/// Result type alias for currency operations.
pub type Result<T> = std::result::Result<T, CurrencyError>;
