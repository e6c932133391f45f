//! Shared collaborators of the ledger services.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use bookstock_core::{DomainError, DomainResult, MovementId, UserId, WorkId};
use bookstock_inventory::{MovementType, StockMovement, Work, total_amount};

use crate::allocation::PartnerAllocationTracker;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::emitter::Emitter;
use crate::error::{LedgerResult, StoreError};
use crate::retry::run_with_retry;
use crate::store::{DeltaOutcome, StockStore, StockTransaction};

/// Store, clock, configuration and sinks shared by the dispatcher, the
/// editor and the query surface.
#[derive(Clone)]
pub struct LedgerContext<S> {
    pub(crate) store: S,
    pub(crate) emitter: Emitter,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: LedgerConfig,
    pub(crate) tracker: PartnerAllocationTracker,
}

impl<S> LedgerContext<S>
where
    S: StockStore,
{
    pub fn new(store: S, emitter: Emitter, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            emitter,
            clock,
            config,
            tracker: PartnerAllocationTracker::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run one transactional attempt function under the configured retry
    /// policy and, when set, the operation deadline. On expiry the in-flight
    /// attempt is dropped, which rolls its transaction back.
    pub(crate) async fn transact<T, F, Fut>(&self, operation: &'static str, attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let run = run_with_retry(&self.config.retry, operation, attempt);
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| StoreError::Timeout(timeout_millis(limit)))?,
            None => run.await,
        }
    }
}

/// Deadline in whole milliseconds, saturating for limits beyond `u64`.
fn timeout_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

/// Apply a stock delta inside `tx`, turning a refused delta into the
/// matching business error.
pub(crate) async fn apply_delta(
    tx: &mut dyn StockTransaction,
    work_id: WorkId,
    delta: i64,
) -> LedgerResult<Work> {
    match tx.apply_delta(work_id, delta).await? {
        DeltaOutcome::Applied(work) => Ok(work),
        DeltaOutcome::Insufficient { available } => {
            Err(DomainError::insufficient(available, delta.abs()).into())
        }
        DeltaOutcome::Missing => Err(DomainError::not_found("work", work_id).into()),
        DeltaOutcome::Overflow => Err(DomainError::validation("stock delta overflows").into()),
    }
}

/// A fresh entry with amounts filled in and descriptive fields left blank.
pub(crate) fn new_entry(
    work: &Work,
    movement_type: MovementType,
    quantity: i64,
    unit_price: i64,
    performed_by: UserId,
    now: DateTime<Utc>,
) -> DomainResult<StockMovement> {
    Ok(StockMovement {
        id: MovementId::new(),
        work_id: work.id_typed(),
        movement_type,
        quantity,
        reason: String::new(),
        reference: String::new(),
        source: None,
        destination: None,
        unit_price,
        total_amount: total_amount(quantity, unit_price)?,
        is_correction: movement_type == MovementType::Correction,
        correction_reason: None,
        performed_by,
        partner_id: None,
        applied_to_stock: true,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(2500)), 2500);
        assert_eq!(timeout_millis(Duration::MAX), u64::MAX);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX / 1000 + 1)), u64::MAX);
    }
}
