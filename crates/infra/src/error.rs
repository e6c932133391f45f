//! Error types of the ledger operations.

use thiserror::Error;

use bookstock_core::DomainError;

/// Storage-layer failure.
///
/// These are infrastructure errors as opposed to domain errors. Only the
/// transient ones are retried by the transaction runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection lost, pool exhausted or closed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization failure or deadlock; the transaction may be re-run.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Any other backend failure (constraint, syntax, ...).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored row could not be mapped back into the domain model.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// The caller's deadline expired; the transaction was rolled back.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

/// Error of every public ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Business-rule violation. Never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_transient())
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            LedgerError::Store(_) => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_conflict_failures_are_transient() {
        assert!(StoreError::Unavailable("pool closed".into()).is_transient());
        assert!(StoreError::Conflict("40001".into()).is_transient());
        assert!(!StoreError::Backend("23514".into()).is_transient());
        assert!(!StoreError::Timeout(50).is_transient());
    }

    #[test]
    fn domain_errors_are_never_transient() {
        let err: LedgerError = DomainError::insufficient(5, 6).into();
        assert!(!err.is_transient());
        assert_eq!(err.as_domain(), Some(&DomainError::insufficient(5, 6)));
        assert_eq!(err.to_string(), "insufficient stock: available 5, requested 6");
    }
}
