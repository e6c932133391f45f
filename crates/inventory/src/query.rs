//! Ledger read-side helpers: filtering, ordering, and statistics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstock_core::{PartnerId, WorkId};

use crate::movement::{MovementType, StockMovement};

/// Half-open creation-time window `[from, to)`; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

/// Filter criteria for ledger listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub work_id: Option<WorkId>,
    pub movement_type: Option<MovementType>,
    pub partner_id: Option<PartnerId>,
    pub period: DateRange,
}

impl MovementFilter {
    pub fn for_work(work_id: WorkId) -> Self {
        Self {
            work_id: Some(work_id),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }

    pub fn with_partner(mut self, partner_id: PartnerId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn within(mut self, period: DateRange) -> Self {
        self.period = period;
        self
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.work_id.is_none_or(|w| movement.work_id == w)
            && self.movement_type.is_none_or(|t| movement.movement_type == t)
            && self.partner_id.is_none_or(|p| movement.partner_id == Some(p))
            && self.period.contains(movement.created_at)
    }
}

/// Listing order: newest first, ties broken by id (v7, time-ordered).
pub fn newest_first(a: &StockMovement, b: &StockMovement) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStatistics {
    pub movement_type: MovementType,
    pub count: u64,
    /// Signed sum of quantities.
    pub total_quantity: i64,
}

/// Aggregate figures over a set of ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementStatistics {
    pub total_movements: u64,
    /// Units that came in.
    pub total_inbound: i64,
    /// Units that went out, as a positive number.
    pub total_outbound: i64,
    pub by_type: Vec<TypeStatistics>,
}

impl MovementStatistics {
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Self {
        let mut stats = Self::default();
        let mut by_type: BTreeMap<MovementType, (u64, i64)> = BTreeMap::new();

        for movement in movements {
            stats.total_movements += 1;
            if movement.quantity > 0 {
                stats.total_inbound += movement.quantity;
            } else {
                stats.total_outbound += movement.quantity.abs();
            }
            let slot = by_type.entry(movement.movement_type).or_default();
            slot.0 += 1;
            slot.1 += movement.quantity;
        }

        stats.by_type = by_type
            .into_iter()
            .map(|(movement_type, (count, total_quantity))| TypeStatistics {
                movement_type,
                count,
                total_quantity,
            })
            .collect();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstock_core::{MovementId, UserId};
    use chrono::Duration;

    fn entry(work_id: WorkId, movement_type: MovementType, quantity: i64, at: DateTime<Utc>) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            work_id,
            movement_type,
            quantity,
            reason: String::new(),
            reference: String::new(),
            source: None,
            destination: None,
            unit_price: 100,
            total_amount: quantity.abs() * 100,
            is_correction: false,
            correction_reason: None,
            performed_by: UserId::new(),
            partner_id: None,
            applied_to_stock: true,
            created_at: at,
        }
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let work = WorkId::new();
        let now = Utc::now();
        let e = entry(work, MovementType::DirectSale, -2, now);

        assert!(MovementFilter::default().matches(&e));
        assert!(MovementFilter::for_work(work).with_type(MovementType::DirectSale).matches(&e));
        assert!(!MovementFilter::for_work(WorkId::new()).matches(&e));
        assert!(!MovementFilter::default().with_partner(PartnerId::new()).matches(&e));
        assert!(
            !MovementFilter::default()
                .within(DateRange::between(now + Duration::seconds(1), now + Duration::hours(1)))
                .matches(&e)
        );
    }

    #[test]
    fn date_range_is_half_open() {
        let now = Utc::now();
        let range = DateRange::between(now, now + Duration::minutes(1));
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::minutes(1)));
    }

    #[test]
    fn newest_first_orders_by_creation_time() {
        let work = WorkId::new();
        let now = Utc::now();
        let mut entries = vec![
            entry(work, MovementType::Inbound, 5, now - Duration::minutes(2)),
            entry(work, MovementType::Inbound, 6, now),
            entry(work, MovementType::Inbound, 7, now - Duration::minutes(1)),
        ];
        entries.sort_by(newest_first);
        let quantities: Vec<_> = entries.iter().map(|e| e.quantity).collect();
        assert_eq!(quantities, vec![6, 7, 5]);
    }

    #[test]
    fn statistics_split_inbound_and_outbound() {
        let work = WorkId::new();
        let now = Utc::now();
        let entries = [
            entry(work, MovementType::Inbound, 100, now),
            entry(work, MovementType::DirectSale, -10, now),
            entry(work, MovementType::DirectSale, -5, now),
            entry(work, MovementType::Correction, 3, now),
        ];

        let stats = MovementStatistics::from_movements(&entries);
        assert_eq!(stats.total_movements, 4);
        assert_eq!(stats.total_inbound, 103);
        assert_eq!(stats.total_outbound, 15);

        let sales = stats
            .by_type
            .iter()
            .find(|t| t.movement_type == MovementType::DirectSale)
            .unwrap();
        assert_eq!(sales.count, 2);
        assert_eq!(sales.total_quantity, -15);
    }
}
