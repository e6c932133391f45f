use serde::{Deserialize, Serialize};

use bookstock_core::{DomainError, DomainResult, Entity, WorkId};

/// Aggregate: the per-work inventory summary.
///
/// `stock` is derived state: it is only ever changed by a ledger-driven delta,
/// and `physical_stock` moves by the identical delta in the same call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    id: WorkId,
    title: String,
    /// Catalog price in minor currency units; default unit price of movements.
    price: i64,
    stock: i64,
    physical_stock: i64,
    min_stock: i64,
    max_stock: Option<i64>,
}

impl Work {
    /// A freshly catalogued work with no stock.
    pub fn new(id: WorkId, title: impl Into<String>, price: i64) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            stock: 0,
            physical_stock: 0,
            min_stock: 0,
            max_stock: None,
        }
    }

    /// Rehydrate from storage.
    pub fn restore(
        id: WorkId,
        title: String,
        price: i64,
        stock: i64,
        physical_stock: i64,
        min_stock: i64,
        max_stock: Option<i64>,
    ) -> Self {
        Self {
            id,
            title,
            price,
            stock,
            physical_stock,
            min_stock,
            max_stock,
        }
    }

    /// Advisory thresholds; never enforced as caps.
    pub fn with_thresholds(mut self, min_stock: i64, max_stock: Option<i64>) -> Self {
        self.min_stock = min_stock;
        self.max_stock = max_stock;
        self
    }

    pub fn id_typed(&self) -> WorkId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn physical_stock(&self) -> i64 {
        self.physical_stock
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }

    pub fn max_stock(&self) -> Option<i64> {
        self.max_stock
    }

    /// Fails with `InsufficientStock` unless `requested` units can leave stock.
    pub fn ensure_available(&self, requested: i64) -> DomainResult<()> {
        if self.stock < requested {
            return Err(DomainError::insufficient(self.stock, requested));
        }
        Ok(())
    }

    /// Apply a signed ledger delta to both counters, returning the new stock.
    ///
    /// A negative delta that would take `stock` below zero is rejected and
    /// leaves the aggregate untouched.
    pub fn apply_delta(&mut self, delta: i64) -> DomainResult<i64> {
        let stock = self
            .stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock delta overflows"))?;
        let physical_stock = self
            .physical_stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock delta overflows"))?;

        if delta < 0 && stock < 0 {
            return Err(DomainError::insufficient(self.stock, -delta));
        }

        self.stock = stock;
        self.physical_stock = physical_stock;
        Ok(self.stock)
    }
}

impl Entity for Work {
    type Id = WorkId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn work_with_stock(stock: i64) -> Work {
        let mut work = Work::new(WorkId::new(), "Grammaire CE1", 2_500);
        if stock > 0 {
            work.apply_delta(stock).unwrap();
        }
        work
    }

    #[test]
    fn apply_delta_moves_both_counters() {
        let mut work = work_with_stock(10);
        assert_eq!(work.apply_delta(-4).unwrap(), 6);
        assert_eq!(work.stock(), 6);
        assert_eq!(work.physical_stock(), 6);
    }

    #[test]
    fn negative_delta_beyond_stock_is_rejected_without_change() {
        let mut work = work_with_stock(5);
        let err = work.apply_delta(-6).unwrap_err();
        assert_eq!(err, DomainError::insufficient(5, 6));
        assert_eq!(work.stock(), 5);
        assert_eq!(work.physical_stock(), 5);
    }

    #[test]
    fn draining_to_exactly_zero_is_allowed() {
        let mut work = work_with_stock(3);
        assert_eq!(work.apply_delta(-3).unwrap(), 0);
    }

    #[test]
    fn ensure_available_reports_both_amounts() {
        let work = work_with_stock(5);
        assert!(work.ensure_available(5).is_ok());
        match work.ensure_available(6) {
            Err(DomainError::InsufficientStock {
                available,
                requested,
            }) => {
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever deltas are attempted, stock never goes negative,
        /// equals the sum of the accepted deltas, and physical stock stays in lock-step.
        #[test]
        fn stock_equals_sum_of_accepted_deltas(
            deltas in prop::collection::vec(-50i64..50i64, 1..40)
        ) {
            let mut work = work_with_stock(0);
            let mut accepted = 0i64;

            for delta in deltas {
                if work.apply_delta(delta).is_ok() {
                    accepted += delta;
                }
                prop_assert!(work.stock() >= 0);
                prop_assert_eq!(work.stock(), work.physical_stock());
            }

            prop_assert_eq!(work.stock(), accepted);
        }
    }
}
