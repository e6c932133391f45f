//! Post-commit audit and notification dispatch.
//!
//! Runs strictly after the transaction has committed. Every sink failure is
//! logged and swallowed: the committed operation stands regardless.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use bookstock_core::UserId;
use bookstock_events::{AuditEntry, AuditSink, Event, Notification, NotificationSink};
use bookstock_inventory::StockEvent;

#[derive(Clone)]
pub struct Emitter {
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}

impl Emitter {
    pub fn new(audit: Arc<dyn AuditSink>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { audit, notifier }
    }

    pub fn emit(&self, performed_by: UserId, event: &StockEvent, notifications: Vec<Notification>) {
        let event_type = event.event_type();

        match AuditEntry::from_event(performed_by, event) {
            Ok(entry) => {
                if let Err(err) = self.audit.record(entry) {
                    warn!(event_type, error = %err, "audit record failed");
                }
            }
            Err(err) => warn!(event_type, error = %err, "audit entry could not be built"),
        }

        for notification in notifications {
            let recipient = notification.user_id;
            if let Err(err) = self.notifier.notify(notification) {
                warn!(event_type, %recipient, error = %err, "notification failed");
            }
        }

        debug!(event_type, "post-commit side effects dispatched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstock_core::{MovementId, WorkId};
    use bookstock_events::{InMemoryAuditLog, InMemoryNotifier, SinkError};
    use bookstock_inventory::MovementDeleted;
    use chrono::Utc;
    use serde_json::json;

    struct Refusing;

    impl AuditSink for Refusing {
        fn record(&self, _entry: AuditEntry) -> Result<(), SinkError> {
            Err(SinkError::Rejected("audit store offline".into()))
        }
    }

    fn deleted() -> StockEvent {
        StockEvent::MovementDeleted(MovementDeleted {
            movement_id: MovementId::new(),
            work_id: WorkId::new(),
            quantity: 3,
            reversed_on_stock: true,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn records_audit_and_notifications() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let emitter = Emitter::new(audit.clone(), notifier.clone());
        let user = UserId::new();

        emitter.emit(
            user,
            &deleted(),
            vec![Notification::new(user, "STOCK_MOVEMENT_DELETED", "t", "m", json!({}))],
        );

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "stock.movement.deleted");
        assert_eq!(notifier.sent_to(user).len(), 1);
    }

    #[test]
    fn audit_failure_does_not_stop_notifications() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let emitter = Emitter::new(Arc::new(Refusing), notifier.clone());
        let user = UserId::new();

        emitter.emit(
            user,
            &deleted(),
            vec![Notification::new(user, "K", "t", "m", json!({}))],
        );

        assert_eq!(notifier.sent().len(), 1);
    }
}
