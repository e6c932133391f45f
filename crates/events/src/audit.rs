//! Audit trail contract (record-only, fire-and-forget).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use bookstock_core::UserId;

use crate::SinkError;
use crate::event::Event;

/// One audit record: who did what, with the structured event as details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub performed_by: UserId,
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry from a committed event; `action` is the event type.
    pub fn from_event<E>(performed_by: UserId, event: &E) -> Result<Self, SinkError>
    where
        E: Event + Serialize,
    {
        let details = serde_json::to_value(event)
            .map_err(|e| SinkError::Rejected(format!("details serialization failed: {e}")))?;

        Ok(Self {
            action: event.event_type().to_string(),
            performed_by,
            details,
            recorded_at: event.occurred_at(),
        })
    }
}

/// Audit log sink.
///
/// Implementations may fail; callers treat failures as non-fatal.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), SinkError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, entry: AuditEntry) -> Result<(), SinkError> {
        (**self).record(entry)
    }
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), SinkError> {
        let mut entries = self.entries.lock().map_err(|_| SinkError::Poisoned)?;
        entries.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Probe {
        at: DateTime<Utc>,
        quantity: i64,
    }

    impl Event for Probe {
        fn event_type(&self) -> &'static str {
            "test.probe"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn entry_uses_event_type_as_action_and_payload_as_details() {
        let at = Utc::now();
        let user = UserId::new();
        let entry = AuditEntry::from_event(user, &Probe { at, quantity: 4 }).unwrap();

        assert_eq!(entry.action, "test.probe");
        assert_eq!(entry.performed_by, user);
        assert_eq!(entry.details["quantity"], 4);
        assert_eq!(entry.recorded_at, at);
    }

    #[test]
    fn in_memory_log_keeps_insertion_order() {
        let log = InMemoryAuditLog::new();
        let user = UserId::new();
        for quantity in [1, 2] {
            let entry = AuditEntry::from_event(user, &Probe { at: Utc::now(), quantity }).unwrap();
            log.record(entry).unwrap();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].details["quantity"], 1);
        assert_eq!(entries[1].details["quantity"], 2);
    }
}
