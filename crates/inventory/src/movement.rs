use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstock_core::{DomainError, DomainResult, Entity, MovementId, PartnerId, UserId, WorkId};

/// Ledger entry type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Inbound,
    PartnerReturn,
    Correction,
    DirectSale,
    PartnerAllocation,
    Damaged,
    Transfer,
    /// Sale reported by a partner out of its allocation.
    PartnerSale,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::Inbound,
        MovementType::PartnerReturn,
        MovementType::Correction,
        MovementType::DirectSale,
        MovementType::PartnerAllocation,
        MovementType::Damaged,
        MovementType::Transfer,
        MovementType::PartnerSale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Inbound => "INBOUND",
            MovementType::PartnerReturn => "PARTNER_RETURN",
            MovementType::Correction => "CORRECTION",
            MovementType::DirectSale => "DIRECT_SALE",
            MovementType::PartnerAllocation => "PARTNER_ALLOCATION",
            MovementType::Damaged => "DAMAGED",
            MovementType::Transfer => "TRANSFER",
            MovementType::PartnerSale => "PARTNER_SALE",
        }
    }

    /// Sign every entry of this type must carry, if it is fixed.
    /// Corrections and transfer legs may go either way.
    pub fn fixed_sign(&self) -> Option<i64> {
        match self {
            MovementType::Inbound | MovementType::PartnerReturn => Some(1),
            MovementType::DirectSale
            | MovementType::PartnerAllocation
            | MovementType::Damaged
            | MovementType::PartnerSale => Some(-1),
            MovementType::Correction | MovementType::Transfer => None,
        }
    }

    /// Entry types that feed a partner's allocation counters.
    pub fn affects_partner(&self) -> bool {
        matches!(
            self,
            MovementType::PartnerAllocation | MovementType::PartnerReturn | MovementType::PartnerSale
        )
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::invalid_operation(format!("unknown movement type '{s}'")))
    }
}

/// One immutable record of a quantity change applied to a work.
///
/// `quantity` is signed: positive is inbound, negative is outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub work_id: WorkId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: String,
    /// Free-text correlation key.
    pub reference: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub unit_price: i64,
    pub total_amount: i64,
    pub is_correction: bool,
    pub correction_reason: Option<String>,
    pub performed_by: UserId,
    pub partner_id: Option<PartnerId>,
    /// Whether `quantity` was applied to the work aggregate. Entries that only
    /// move partner-side counters (partner sales, ledger-only returns) are not.
    pub applied_to_stock: bool,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Contribution of this entry to the work's stock.
    pub fn stock_effect(&self) -> i64 {
        if self.applied_to_stock {
            self.quantity
        } else {
            0
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.quantity > 0
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `|quantity| × unit_price`, rejecting overflow.
pub fn total_amount(quantity: i64, unit_price: i64) -> DomainResult<i64> {
    quantity
        .checked_abs()
        .and_then(|q| q.checked_mul(unit_price))
        .ok_or_else(|| DomainError::validation("total amount overflows"))
}

/// Controlled update of a recorded entry.
///
/// Every field defaults to the original value. `total_amount` is recomputed
/// from the patched quantity and unit price unless supplied explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPatch {
    pub work_id: Option<WorkId>,
    pub movement_type: Option<MovementType>,
    pub quantity: Option<i64>,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub unit_price: Option<i64>,
    pub total_amount: Option<i64>,
    pub correction_reason: Option<String>,
}

impl MovementPatch {
    pub fn quantity(quantity: i64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn with_work(mut self, work_id: WorkId) -> Self {
        self.work_id = Some(work_id);
        self
    }

    pub fn with_unit_price(mut self, unit_price: i64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Produce the patched entry. Identity, author and timestamps are kept.
    pub fn apply_to(&self, original: &StockMovement) -> DomainResult<StockMovement> {
        let quantity = self.quantity.unwrap_or(original.quantity);
        if quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }

        let unit_price = self.unit_price.unwrap_or(original.unit_price);
        if self.unit_price.is_some() && unit_price <= 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }

        let total_amount = match self.total_amount {
            Some(total) if total < 0 => {
                return Err(DomainError::validation("total amount cannot be negative"));
            }
            Some(total) => total,
            None => total_amount(quantity, unit_price)?,
        };

        let movement_type = self.movement_type.unwrap_or(original.movement_type);
        match movement_type.fixed_sign() {
            Some(sign) if quantity.signum() != sign => {
                return Err(DomainError::validation(format!(
                    "a {movement_type} entry must have a {} quantity",
                    if sign > 0 { "positive" } else { "negative" }
                )));
            }
            None if movement_type == MovementType::Transfer
                && quantity.signum() != original.quantity.signum() =>
            {
                return Err(DomainError::validation(
                    "a TRANSFER leg cannot change direction",
                ));
            }
            _ => {}
        }

        let correction_reason = self
            .correction_reason
            .clone()
            .or_else(|| original.correction_reason.clone());

        Ok(StockMovement {
            id: original.id,
            work_id: self.work_id.unwrap_or(original.work_id),
            movement_type,
            quantity,
            reason: self.reason.clone().unwrap_or_else(|| original.reason.clone()),
            reference: self
                .reference
                .clone()
                .unwrap_or_else(|| original.reference.clone()),
            source: self.source.clone().or_else(|| original.source.clone()),
            destination: self
                .destination
                .clone()
                .or_else(|| original.destination.clone()),
            unit_price,
            total_amount,
            is_correction: original.is_correction || movement_type == MovementType::Correction,
            correction_reason,
            performed_by: original.performed_by,
            partner_id: original.partner_id,
            applied_to_stock: original.applied_to_stock,
            created_at: original.created_at,
        })
    }
}
