use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstock_core::{MovementId, PartnerId, WorkId};
use bookstock_events::Event;

use crate::operation::{OperationType, SubType};

/// Event: OperationExecuted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationExecuted {
    pub operation_type: OperationType,
    pub sub_type: SubType,
    pub work_id: WorkId,
    pub work_title: String,
    /// Signed ledger quantity of the primary entry.
    pub quantity: i64,
    pub movement_id: MovementId,
    pub transfer_movement_id: Option<MovementId>,
    pub partner_id: Option<PartnerId>,
    pub reason: String,
    pub new_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementUpdated {
    pub movement_id: MovementId,
    pub previous_work_id: WorkId,
    pub work_id: WorkId,
    pub previous_quantity: i64,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDeleted {
    pub movement_id: MovementId,
    pub work_id: WorkId,
    pub quantity: i64,
    pub reversed_on_stock: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementCorrected (compensating entries appended).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCorrected {
    pub original_movement_id: MovementId,
    pub cancel_movement_id: MovementId,
    /// Absent when the entry was corrected down to zero.
    pub corrected_movement_id: Option<MovementId>,
    pub work_id: WorkId,
    pub original_quantity: i64,
    pub corrected_quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLevelCorrected (physical count reconciliation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelCorrected {
    pub work_id: WorkId,
    pub movement_id: MovementId,
    pub previous_stock: i64,
    pub counted_stock: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartnerSaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSaleRecorded {
    pub partner_id: PartnerId,
    pub work_id: WorkId,
    pub movement_id: MovementId,
    pub quantity: i64,
    pub client: Option<String>,
    pub available_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    OperationExecuted(OperationExecuted),
    MovementUpdated(MovementUpdated),
    MovementDeleted(MovementDeleted),
    MovementCorrected(MovementCorrected),
    StockLevelCorrected(StockLevelCorrected),
    PartnerSaleRecorded(PartnerSaleRecorded),
}

impl StockEvent {
    pub fn work_id(&self) -> WorkId {
        match self {
            StockEvent::OperationExecuted(e) => e.work_id,
            StockEvent::MovementUpdated(e) => e.work_id,
            StockEvent::MovementDeleted(e) => e.work_id,
            StockEvent::MovementCorrected(e) => e.work_id,
            StockEvent::StockLevelCorrected(e) => e.work_id,
            StockEvent::PartnerSaleRecorded(e) => e.work_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::OperationExecuted(_) => "stock.operation.executed",
            StockEvent::MovementUpdated(_) => "stock.movement.updated",
            StockEvent::MovementDeleted(_) => "stock.movement.deleted",
            StockEvent::MovementCorrected(_) => "stock.movement.corrected",
            StockEvent::StockLevelCorrected(_) => "stock.level.corrected",
            StockEvent::PartnerSaleRecorded(_) => "stock.partner_sale.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::OperationExecuted(e) => e.occurred_at,
            StockEvent::MovementUpdated(e) => e.occurred_at,
            StockEvent::MovementDeleted(e) => e.occurred_at,
            StockEvent::MovementCorrected(e) => e.occurred_at,
            StockEvent::StockLevelCorrected(e) => e.occurred_at,
            StockEvent::PartnerSaleRecorded(e) => e.occurred_at,
        }
    }
}
