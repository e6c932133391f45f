//! Read side: listings, statistics, partner allocations and stock alerts.
//!
//! Every call is a pure projection over committed state; none of them writes.

use tracing::instrument;

use bookstock_core::{DomainError, MovementId, PartnerId};
use bookstock_inventory::{
    DateRange, MovementFilter, MovementStatistics, PartnerStock, StockAlert, StockMovement,
    stock_alerts,
};

use crate::error::LedgerResult;
use crate::store::{MovementPage, Pagination, StockStore};

pub struct MovementQuery<S> {
    store: S,
}

impl<S> MovementQuery<S>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Matching entries, newest first, with the total count for paging.
    #[instrument(skip(self), err)]
    pub async fn list(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> LedgerResult<MovementPage> {
        Ok(self.store.movements(filter, pagination).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn movement(&self, id: MovementId) -> LedgerResult<StockMovement> {
        self.store
            .movement(id)
            .await?
            .ok_or_else(|| DomainError::not_found("movement", id).into())
    }

    /// Aggregate figures over every entry recorded in `period`.
    pub async fn statistics(&self, period: DateRange) -> LedgerResult<MovementStatistics> {
        self.statistics_for(&MovementFilter::default().within(period))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn statistics_for(&self, filter: &MovementFilter) -> LedgerResult<MovementStatistics> {
        Ok(self.store.movement_statistics(filter).await?)
    }

    /// Allocation rows held by one partner.
    #[instrument(skip(self), err)]
    pub async fn partner_allocations(&self, partner_id: PartnerId) -> LedgerResult<Vec<PartnerStock>> {
        Ok(self.store.partner_stocks(partner_id).await?)
    }

    /// Works whose stock crosses a threshold, most severe first.
    #[instrument(skip(self), err)]
    pub async fn stock_alerts(&self) -> LedgerResult<Vec<StockAlert>> {
        let works = self.store.works().await?;
        Ok(stock_alerts(&works))
    }
}
