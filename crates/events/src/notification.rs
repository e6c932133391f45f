//! User notification contract (one call per affected party).

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use bookstock_core::UserId;

use crate::SinkError;

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    /// Machine-readable kind, e.g. `STOCK_ALLOCATION`.
    pub kind: String,
    pub payload: JsonValue,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            payload,
        }
    }
}

/// Notification delivery sink.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), SinkError>;
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn notify(&self, notification: Notification) -> Result<(), SinkError> {
        (**self).notify(notification)
    }
}

/// In-memory notifier for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Notifications addressed to one user.
    pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

impl NotificationSink for InMemoryNotifier {
    fn notify(&self, notification: Notification) -> Result<(), SinkError> {
        let mut sent = self.sent.lock().map_err(|_| SinkError::Poisoned)?;
        sent.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sent_to_filters_by_recipient() {
        let notifier = InMemoryNotifier::new();
        let alice = UserId::new();
        let bob = UserId::new();

        notifier
            .notify(Notification::new(alice, "A", "t", "m", json!({})))
            .unwrap();
        notifier
            .notify(Notification::new(bob, "B", "t", "m", json!({})))
            .unwrap();

        let to_alice = notifier.sent_to(alice);
        assert_eq!(to_alice.len(), 1);
        assert_eq!(to_alice[0].kind, "A");
        assert_eq!(notifier.sent().len(), 2);
    }
}
