//! Partner allocation tracker.
//!
//! Derived state only: every call runs inside the caller's transaction and
//! upserts the `(partner, work)` row, recomputing the available quantity.

use tracing::debug;

use bookstock_core::{DomainError, PartnerId, WorkId};
use bookstock_inventory::{MovementType, PartnerStock, PartnerStockKey, StockMovement};

use crate::error::LedgerResult;
use crate::store::StockTransaction;

/// Which counter of an allocation row an entry feeds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PartnerCounter {
    Allocated,
    Returned,
    Sold,
}

/// Counter contribution of one ledger entry, if it is partner-linked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PartnerEffect {
    pub key: PartnerStockKey,
    pub counter: PartnerCounter,
    /// Always non-negative.
    pub amount: i64,
}

impl PartnerEffect {
    pub fn of(movement: &StockMovement) -> Option<Self> {
        let partner_id = movement.partner_id?;
        let counter = match movement.movement_type {
            MovementType::PartnerAllocation => PartnerCounter::Allocated,
            MovementType::PartnerReturn => PartnerCounter::Returned,
            MovementType::PartnerSale => PartnerCounter::Sold,
            _ => return None,
        };
        Some(Self {
            key: PartnerStockKey {
                partner_id,
                work_id: movement.work_id,
            },
            counter,
            amount: movement.quantity.abs(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartnerAllocationTracker;

impl PartnerAllocationTracker {
    pub fn new() -> Self {
        Self
    }

    /// Units handed over to a partner.
    pub async fn upsert_allocation(
        &self,
        tx: &mut dyn StockTransaction,
        partner_id: PartnerId,
        work_id: WorkId,
        delta: i64,
    ) -> LedgerResult<PartnerStock> {
        self.adjust(tx, key(partner_id, work_id), PartnerCounter::Allocated, delta)
            .await
    }

    /// Units sent back by a partner.
    pub async fn upsert_return(
        &self,
        tx: &mut dyn StockTransaction,
        partner_id: PartnerId,
        work_id: WorkId,
        delta: i64,
    ) -> LedgerResult<PartnerStock> {
        self.adjust(tx, key(partner_id, work_id), PartnerCounter::Returned, delta)
            .await
    }

    /// Units sold by a partner out of its allocation. Unlike the two
    /// upserts, a sale needs an existing allocation row.
    pub async fn record_sale(
        &self,
        tx: &mut dyn StockTransaction,
        partner_id: PartnerId,
        work_id: WorkId,
        quantity: i64,
    ) -> LedgerResult<PartnerStock> {
        let key = key(partner_id, work_id);
        if tx.find_partner_stock(key).await?.is_none() {
            return Err(DomainError::validation(format!(
                "partner {partner_id} holds no allocation of work {work_id}"
            ))
            .into());
        }
        self.adjust(tx, key, PartnerCounter::Sold, quantity).await
    }

    /// Apply an edit-time correction: like `adjust`, but the available
    /// quantity may not be pushed below zero by the change.
    pub async fn reconcile(
        &self,
        tx: &mut dyn StockTransaction,
        key: PartnerStockKey,
        counter: PartnerCounter,
        delta: i64,
    ) -> LedgerResult<PartnerStock> {
        let before = tx.lock_partner_stock(key).await?.available_quantity();
        let row = self.adjust(tx, key, counter, delta).await?;
        let after = row.available_quantity();
        if after < 0 && after < before {
            return Err(DomainError::insufficient(before.max(0), before - after).into());
        }
        Ok(row)
    }

    async fn adjust(
        &self,
        tx: &mut dyn StockTransaction,
        key: PartnerStockKey,
        counter: PartnerCounter,
        delta: i64,
    ) -> LedgerResult<PartnerStock> {
        let mut row = tx.lock_partner_stock(key).await?;

        match counter {
            PartnerCounter::Allocated => row.allocate(delta)?,
            PartnerCounter::Returned => row.record_return(delta)?,
            PartnerCounter::Sold => row.record_sale(delta)?,
        }

        tx.save_partner_stock(&row).await?;
        debug!(
            partner_id = %key.partner_id,
            work_id = %key.work_id,
            ?counter,
            delta,
            available = row.available_quantity(),
            "partner allocation updated"
        );
        Ok(row)
    }
}

fn key(partner_id: PartnerId, work_id: WorkId) -> PartnerStockKey {
    PartnerStockKey {
        partner_id,
        work_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStockStore, StockStore};
    use bookstock_core::{MovementId, UserId};
    use chrono::Utc;

    fn partner_entry(movement_type: MovementType, quantity: i64) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            work_id: WorkId::new(),
            movement_type,
            quantity,
            reason: String::new(),
            reference: String::new(),
            source: None,
            destination: None,
            unit_price: 1,
            total_amount: quantity.abs(),
            is_correction: false,
            correction_reason: None,
            performed_by: UserId::new(),
            partner_id: Some(PartnerId::new()),
            applied_to_stock: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn effect_maps_entry_types_to_counters() {
        let alloc = PartnerEffect::of(&partner_entry(MovementType::PartnerAllocation, -20)).unwrap();
        assert_eq!(alloc.counter, PartnerCounter::Allocated);
        assert_eq!(alloc.amount, 20);

        let ret = PartnerEffect::of(&partner_entry(MovementType::PartnerReturn, 5)).unwrap();
        assert_eq!(ret.counter, PartnerCounter::Returned);

        assert!(PartnerEffect::of(&partner_entry(MovementType::DirectSale, -1)).is_none());

        let mut unlinked = partner_entry(MovementType::PartnerAllocation, -1);
        unlinked.partner_id = None;
        assert!(PartnerEffect::of(&unlinked).is_none());
    }

    #[tokio::test]
    async fn allocation_creates_the_row_then_return_reduces_available() {
        let store = InMemoryStockStore::new();
        let tracker = PartnerAllocationTracker::new();
        let (partner, work) = (PartnerId::new(), WorkId::new());

        let mut tx = store.begin().await.unwrap();
        let row = tracker.upsert_allocation(&mut *tx, partner, work, 20).await.unwrap();
        assert_eq!(row.available_quantity(), 20);

        let row = tracker.upsert_return(&mut *tx, partner, work, 5).await.unwrap();
        assert_eq!(row.allocated_quantity(), 20);
        assert_eq!(row.returned_quantity(), 5);
        assert_eq!(row.available_quantity(), 15);
        tx.commit().await.unwrap();

        let saved = store.partner_stock(key(partner, work)).await.unwrap();
        assert_eq!(saved.available_quantity(), 15);
    }

    #[tokio::test]
    async fn locking_a_missing_row_starts_from_zero() {
        let store = InMemoryStockStore::new();
        let k = key(PartnerId::new(), WorkId::new());

        let mut tx = store.begin().await.unwrap();
        let row = tx.lock_partner_stock(k).await.unwrap();
        assert_eq!(row.key(), k);
        assert_eq!(row.allocated_quantity(), 0);
        assert_eq!(row.available_quantity(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_allocations_are_not_lost() {
        let store = InMemoryStockStore::new();
        let (partner, work) = (PartnerId::new(), WorkId::new());

        let tasks: Vec<_> = (1..=8)
            .map(|quantity| {
                let store = store.clone();
                tokio::spawn(async move {
                    let tracker = PartnerAllocationTracker::new();
                    let mut tx = store.begin().await.unwrap();
                    tracker
                        .upsert_allocation(&mut *tx, partner, work, quantity)
                        .await
                        .unwrap();
                    tx.commit().await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let saved = store.partner_stock(key(partner, work)).await.unwrap();
        assert_eq!(saved.allocated_quantity(), 36);
        assert_eq!(saved.available_quantity(), 36);
    }

    #[tokio::test]
    async fn sale_without_allocation_is_rejected() {
        let store = InMemoryStockStore::new();
        let tracker = PartnerAllocationTracker::new();

        let mut tx = store.begin().await.unwrap();
        let err = tracker
            .record_sale(&mut *tx, PartnerId::new(), WorkId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn reconcile_refuses_to_drive_available_negative() {
        let store = InMemoryStockStore::new();
        let tracker = PartnerAllocationTracker::new();
        let (partner, work) = (PartnerId::new(), WorkId::new());

        let mut tx = store.begin().await.unwrap();
        tracker.upsert_allocation(&mut *tx, partner, work, 10).await.unwrap();
        tracker.record_sale(&mut *tx, partner, work, 8).await.unwrap();

        let err = tracker
            .reconcile(&mut *tx, key(partner, work), PartnerCounter::Allocated, -5)
            .await
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::insufficient(2, 5)));
    }
}
