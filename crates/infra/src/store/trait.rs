use std::sync::Arc;

use async_trait::async_trait;

use bookstock_core::{MovementId, PartnerId, WorkId};
use bookstock_inventory::{
    MovementFilter, MovementStatistics, Partner, PartnerStock, PartnerStockKey, StockMovement, Work,
};

use super::page::{MovementPage, Pagination};
use crate::error::StoreError;

/// Result of a conditional stock delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The delta was applied; carries the refreshed aggregate.
    Applied(Work),
    /// The delta would take stock below zero; nothing was written.
    Insufficient { available: i64 },
    /// No such work.
    Missing,
    /// The counters would leave the `i64` range; nothing was written.
    Overflow,
}

/// Transactional stock ledger storage.
///
/// The Ledger Entry Store, the per-work aggregate and the partner allocation
/// rows live behind one store so that a single transaction covers all three.
/// Reads outside a transaction are pure projections.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Open a transaction. It must be committed explicitly; dropping it
    /// without committing rolls every write back.
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError>;

    async fn work(&self, id: WorkId) -> Result<Option<Work>, StoreError>;

    async fn works(&self) -> Result<Vec<Work>, StoreError>;

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError>;

    /// Entries matching `filter`, newest first.
    async fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    async fn movement_statistics(
        &self,
        filter: &MovementFilter,
    ) -> Result<MovementStatistics, StoreError>;

    async fn partner_stocks(&self, partner_id: PartnerId) -> Result<Vec<PartnerStock>, StoreError>;
}

/// One atomic unit of work over the ledger, the aggregates and the
/// partner allocation rows.
#[async_trait]
pub trait StockTransaction: Send {
    async fn find_work(&mut self, id: WorkId) -> Result<Option<Work>, StoreError>;

    /// Add `delta` to `stock` and `physical_stock` together, unless that
    /// would take `stock` below zero. Check and write are one atomic step.
    async fn apply_delta(&mut self, id: WorkId, delta: i64) -> Result<DeltaOutcome, StoreError>;

    async fn find_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, StoreError>;

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<StockMovement>, StoreError>;

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError>;

    async fn update_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError>;

    async fn delete_movement(&mut self, id: MovementId) -> Result<(), StoreError>;

    async fn find_partner_stock(
        &mut self,
        key: PartnerStockKey,
    ) -> Result<Option<PartnerStock>, StoreError>;

    /// The allocation row under a write lock held until the transaction
    /// ends, creating an all-zero row first when none exists. Every
    /// read-modify-write of a row starts here.
    async fn lock_partner_stock(&mut self, key: PartnerStockKey) -> Result<PartnerStock, StoreError>;

    /// Insert or replace the allocation row.
    async fn save_partner_stock(&mut self, row: &PartnerStock) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn work(&self, id: WorkId) -> Result<Option<Work>, StoreError> {
        (**self).work(id).await
    }

    async fn works(&self) -> Result<Vec<Work>, StoreError> {
        (**self).works().await
    }

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        (**self).movement(id).await
    }

    async fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).movements(filter, pagination).await
    }

    async fn movement_statistics(
        &self,
        filter: &MovementFilter,
    ) -> Result<MovementStatistics, StoreError> {
        (**self).movement_statistics(filter).await
    }

    async fn partner_stocks(&self, partner_id: PartnerId) -> Result<Vec<PartnerStock>, StoreError> {
        (**self).partner_stocks(partner_id).await
    }
}
