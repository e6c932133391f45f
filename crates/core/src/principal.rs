//! The acting principal, as supplied by the upstream authorization layer.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Role of the acting user on the distribution platform.
///
/// The ledger never checks permissions; the role is carried for audit only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Head of the publishing house (runs the stock workflow).
    Director,
    Partner,
    Representative,
    Author,
    Designer,
    Client,
}

/// Pre-validated `(performedBy, role)` fact for one call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}
