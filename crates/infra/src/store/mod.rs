//! Transactional storage boundary for the stock ledger.
//!
//! The ledger entries, the per-work aggregates and the partner allocation
//! rows are shared mutable state. They are only ever written through a
//! `StockTransaction`, which commits all three together or none of them.

pub mod in_memory;
pub mod page;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use page::{MovementPage, Pagination};
pub use postgres::PostgresStockStore;
pub use r#trait::{DeltaOutcome, StockStore, StockTransaction};
