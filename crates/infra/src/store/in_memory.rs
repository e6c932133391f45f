use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bookstock_core::{DomainError, MovementId, PartnerId, WorkId};
use bookstock_inventory::{
    MovementFilter, MovementStatistics, Partner, PartnerStock, PartnerStockKey, StockMovement, Work,
    newest_first,
};

use super::page::{MovementPage, Pagination};
use super::r#trait::{DeltaOutcome, StockStore, StockTransaction};
use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
struct StockState {
    works: HashMap<WorkId, Work>,
    partners: HashMap<PartnerId, Partner>,
    movements: HashMap<MovementId, StockMovement>,
    partner_stocks: HashMap<PartnerStockKey, PartnerStock>,
}

impl StockState {
    fn matching(&self, filter: &MovementFilter) -> Vec<StockMovement> {
        let mut found: Vec<StockMovement> = self
            .movements
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        found.sort_by(newest_first);
        found
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. A transaction holds the single state lock for its
/// whole lifetime and works on a private copy that replaces the shared state
/// on commit, so transactions are fully serialized.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<StockState>>,
    injected_failures: Arc<AtomicU32>,
    commit_delay: Option<Duration>,
    begun: Arc<AtomicU32>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow every commit down; lets tests hit a caller deadline mid-transaction.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Make the next `count` commits fail with a transient conflict.
    pub fn fail_next_commits(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of transactions opened so far.
    pub fn transactions_begun(&self) -> u32 {
        self.begun.load(Ordering::SeqCst)
    }

    pub async fn insert_work(&self, work: Work) {
        self.state.lock().await.works.insert(work.id_typed(), work);
    }

    pub async fn insert_partner(&self, partner: Partner) {
        self.state.lock().await.partners.insert(partner.id, partner);
    }

    /// Every entry of a work, applied or not.
    pub async fn ledger_of(&self, work_id: WorkId) -> Vec<StockMovement> {
        self.state
            .lock()
            .await
            .matching(&MovementFilter::for_work(work_id))
    }

    pub async fn partner_stock(&self, key: PartnerStockKey) -> Option<PartnerStock> {
        self.state.lock().await.partner_stocks.get(&key).cloned()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            injected_failures: self.injected_failures.clone(),
            commit_delay: self.commit_delay,
        }))
    }

    async fn work(&self, id: WorkId) -> Result<Option<Work>, StoreError> {
        Ok(self.state.lock().await.works.get(&id).cloned())
    }

    async fn works(&self) -> Result<Vec<Work>, StoreError> {
        let state = self.state.lock().await;
        let mut works: Vec<Work> = state.works.values().cloned().collect();
        works.sort_by(|a, b| a.title().cmp(b.title()));
        Ok(works)
    }

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        Ok(self.state.lock().await.movements.get(&id).cloned())
    }

    async fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let all = self.state.lock().await.matching(filter);
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        Ok(MovementPage::new(page, total, pagination))
    }

    async fn movement_statistics(
        &self,
        filter: &MovementFilter,
    ) -> Result<MovementStatistics, StoreError> {
        let all = self.state.lock().await.matching(filter);
        Ok(MovementStatistics::from_movements(&all))
    }

    async fn partner_stocks(&self, partner_id: PartnerId) -> Result<Vec<PartnerStock>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<PartnerStock> = state
            .partner_stocks
            .values()
            .filter(|row| row.partner_id() == partner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.key());
        Ok(rows)
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<StockState>,
    working: StockState,
    injected_failures: Arc<AtomicU32>,
    commit_delay: Option<Duration>,
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn find_work(&mut self, id: WorkId) -> Result<Option<Work>, StoreError> {
        Ok(self.working.works.get(&id).cloned())
    }

    async fn apply_delta(&mut self, id: WorkId, delta: i64) -> Result<DeltaOutcome, StoreError> {
        let Some(work) = self.working.works.get_mut(&id) else {
            return Ok(DeltaOutcome::Missing);
        };
        match work.apply_delta(delta) {
            Ok(_) => Ok(DeltaOutcome::Applied(work.clone())),
            Err(DomainError::InsufficientStock { available, .. }) => {
                Ok(DeltaOutcome::Insufficient { available })
            }
            Err(_) => Ok(DeltaOutcome::Overflow),
        }
    }

    async fn find_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, StoreError> {
        Ok(self.working.partners.get(&id).cloned())
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        Ok(self.working.movements.get(&id).cloned())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        if self.working.movements.contains_key(&movement.id) {
            return Err(StoreError::Backend(format!(
                "duplicate movement id {}",
                movement.id
            )));
        }
        self.working.movements.insert(movement.id, movement.clone());
        Ok(())
    }

    async fn update_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        match self.working.movements.get_mut(&movement.id) {
            Some(slot) => {
                *slot = movement.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "movement {} vanished during update",
                movement.id
            ))),
        }
    }

    async fn delete_movement(&mut self, id: MovementId) -> Result<(), StoreError> {
        self.working.movements.remove(&id);
        Ok(())
    }

    async fn find_partner_stock(
        &mut self,
        key: PartnerStockKey,
    ) -> Result<Option<PartnerStock>, StoreError> {
        Ok(self.working.partner_stocks.get(&key).cloned())
    }

    async fn lock_partner_stock(&mut self, key: PartnerStockKey) -> Result<PartnerStock, StoreError> {
        Ok(self
            .working
            .partner_stocks
            .entry(key)
            .or_insert_with(|| PartnerStock::new(key.partner_id, key.work_id))
            .clone())
    }

    async fn save_partner_stock(&mut self, row: &PartnerStock) -> Result<(), StoreError> {
        self.working.partner_stocks.insert(row.key(), row.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = *self;
        if let Some(delay) = this.commit_delay {
            tokio::time::sleep(delay).await;
        }

        let pending = this.injected_failures.load(Ordering::SeqCst);
        if pending > 0 {
            this.injected_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict("injected serialization failure".to_string()));
        }

        std::mem::swap(&mut *this.guard, &mut this.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(stock: i64) -> Work {
        Work::restore(WorkId::new(), "Calcul CM2".to_string(), 1_000, stock, stock, 0, None)
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_state_untouched() {
        let store = InMemoryStockStore::new();
        let w = work(10);
        let id = w.id_typed();
        store.insert_work(w).await;

        {
            let mut tx = store.begin().await.unwrap();
            let outcome = tx.apply_delta(id, -4).await.unwrap();
            assert!(matches!(outcome, DeltaOutcome::Applied(ref w) if w.stock() == 6));
        }

        assert_eq!(store.work(id).await.unwrap().unwrap().stock(), 10);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryStockStore::new();
        let w = work(10);
        let id = w.id_typed();
        store.insert_work(w).await;

        let mut tx = store.begin().await.unwrap();
        tx.apply_delta(id, 5).await.unwrap();
        tx.commit().await.unwrap();

        let after = store.work(id).await.unwrap().unwrap();
        assert_eq!(after.stock(), 15);
        assert_eq!(after.physical_stock(), 15);
    }

    #[tokio::test]
    async fn conditional_delta_reports_available_stock() {
        let store = InMemoryStockStore::new();
        let w = work(3);
        let id = w.id_typed();
        store.insert_work(w).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.apply_delta(id, -4).await.unwrap(),
            DeltaOutcome::Insufficient { available: 3 }
        );
        assert_eq!(
            tx.apply_delta(WorkId::new(), 1).await.unwrap(),
            DeltaOutcome::Missing
        );
    }

    #[tokio::test]
    async fn delta_past_the_counter_range_is_refused() {
        let store = InMemoryStockStore::new();
        let w = work(i64::MAX);
        let id = w.id_typed();
        store.insert_work(w).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.apply_delta(id, 1).await.unwrap(), DeltaOutcome::Overflow);
        assert_eq!(
            tx.find_work(id).await.unwrap().unwrap().stock(),
            i64::MAX
        );
    }

    #[tokio::test]
    async fn injected_failure_discards_the_transaction() {
        let store = InMemoryStockStore::new();
        let w = work(10);
        let id = w.id_typed();
        store.insert_work(w).await;
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        tx.apply_delta(id, -1).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.work(id).await.unwrap().unwrap().stock(), 10);

        let mut tx = store.begin().await.unwrap();
        tx.apply_delta(id, -1).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.work(id).await.unwrap().unwrap().stock(), 9);
        assert_eq!(store.transactions_begun(), 2);
    }
}
