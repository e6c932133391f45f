//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (validation, stock
/// sufficiency, retention policy). Infrastructure concerns belong elsewhere.
/// None of these are retried: they describe a rule violation, not a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced work, ledger entry or partner does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An outbound quantity exceeds what is currently available.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// The requested operation is not recognised or contradicts its direction.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A ledger entry is too old to be deleted outright.
    #[error(
        "retention window exceeded: entry is {age_days} day(s) old, deletion allowed within {window_days} day(s); record a correction instead"
    )]
    RetentionWindowExceeded { age_days: i64, window_days: i64 },

    /// A value failed validation (missing/zero quantity, non-positive amounts).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn insufficient(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_carries_both_amounts() {
        let msg = DomainError::insufficient(5, 6).to_string();
        assert!(msg.contains("available 5"));
        assert!(msg.contains("requested 6"));
    }

    #[test]
    fn not_found_names_the_entity() {
        let msg = DomainError::not_found("work", "abc").to_string();
        assert_eq!(msg, "work not found: abc");
    }
}
