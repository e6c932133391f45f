//! Stock events and the fire-and-forget collaborators that receive them.
//!
//! The ledger commits first and reports afterwards: audit entries and user
//! notifications are delivered through the sinks defined here, and a sink
//! failure never reaches back into the committed transaction.

pub mod audit;
pub mod event;
pub mod notification;

pub use audit::{AuditEntry, AuditSink, InMemoryAuditLog};
pub use event::Event;
pub use notification::{InMemoryNotifier, Notification, NotificationSink};

/// Error returned by a sink that could not accept a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Internal lock poisoning.
    #[error("sink lock poisoned")]
    Poisoned,
    /// The downstream collaborator refused or failed to store the record.
    #[error("sink rejected record: {0}")]
    Rejected(String),
}
