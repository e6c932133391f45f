//! Stock ledger domain module.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no storage, no clock).

pub mod alert;
pub mod event;
pub mod movement;
pub mod operation;
pub mod partner;
pub mod query;
pub mod work;

pub use alert::{AlertKind, AlertSeverity, StockAlert, stock_alerts};
pub use event::{
    MovementCorrected, MovementDeleted, MovementUpdated, OperationExecuted, PartnerSaleRecorded,
    StockEvent, StockLevelCorrected,
};
pub use movement::{MovementPatch, MovementType, StockMovement, total_amount};
pub use operation::{Classification, Direction, OperationType, Sign, StockOperation, SubType};
pub use partner::{Partner, PartnerReturnPolicy, PartnerStock, PartnerStockKey};
pub use query::{DateRange, MovementFilter, MovementStatistics, TypeStatistics, newest_first};
pub use work::Work;
