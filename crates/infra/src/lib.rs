//! Infrastructure layer: transactional stores, retry, configuration and the
//! ledger services built on top of them.
//!
//! The services share one [`LedgerContext`]:
//!
//! - [`WorkflowDispatcher`] classifies and executes stock operations,
//! - [`MovementEditor`] edits, deletes and compensates recorded entries,
//! - [`MovementQuery`] serves read projections.

pub mod allocation;
pub mod clock;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod editor;
pub mod emitter;
pub mod error;
pub mod query;
pub mod retry;
pub mod store;


pub use allocation::{PartnerAllocationTracker, PartnerCounter, PartnerEffect};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LedgerConfig;
pub use context::LedgerContext;
pub use dispatcher::{OperationResult, PartnerSaleResult, WorkflowDispatcher};
pub use editor::{MovementCorrection, MovementEditor};
pub use emitter::Emitter;
pub use error::{LedgerError, LedgerResult, StoreError};
pub use query::MovementQuery;
pub use retry::{BackoffStrategy, RetryPolicy, run_with_retry};
pub use store::{
    DeltaOutcome, InMemoryStockStore, MovementPage, Pagination, PostgresStockStore, StockStore,
    StockTransaction,
};
