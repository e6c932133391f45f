//! Advisory stock alerts derived from a work's thresholds.

use serde::{Deserialize, Serialize};

use bookstock_core::WorkId;

use crate::work::Work;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    OutOfStock,
    LowStock,
    ExcessStock,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub work_id: WorkId,
    pub title: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub stock: i64,
    pub min_stock: i64,
    pub max_stock: Option<i64>,
    pub message: String,
}

impl StockAlert {
    /// At most one alert per work; out-of-stock wins over low stock.
    pub fn for_work(work: &Work) -> Option<Self> {
        let stock = work.stock();
        let min = work.min_stock();

        let (kind, severity, message) = if stock == 0 {
            (
                AlertKind::OutOfStock,
                AlertSeverity::High,
                format!("'{}' is out of stock", work.title()),
            )
        } else if stock <= min {
            let severity = if stock <= min / 2 {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            (
                AlertKind::LowStock,
                severity,
                format!("'{}' is low on stock ({stock} left, minimum {min})", work.title()),
            )
        } else {
            match work.max_stock() {
                Some(max) if stock >= max => (
                    AlertKind::ExcessStock,
                    AlertSeverity::Low,
                    format!("'{}' exceeds its maximum ({stock} of {max})", work.title()),
                ),
                _ => return None,
            }
        };

        Some(Self {
            work_id: work.id_typed(),
            title: work.title().to_string(),
            kind,
            severity,
            stock,
            min_stock: min,
            max_stock: work.max_stock(),
            message,
        })
    }
}

/// Alerts for every work that needs attention, most severe first.
pub fn stock_alerts<'a>(works: impl IntoIterator<Item = &'a Work>) -> Vec<StockAlert> {
    let mut alerts: Vec<StockAlert> = works.into_iter().filter_map(StockAlert::for_work).collect();
    alerts.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.stock.cmp(&b.stock)));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(stock: i64, min: i64, max: Option<i64>) -> Work {
        Work::restore(WorkId::new(), "Lecture CP".to_string(), 1_500, stock, stock, min, max)
    }

    #[test]
    fn empty_work_is_out_of_stock() {
        let alert = StockAlert::for_work(&work(0, 5, None)).unwrap();
        assert_eq!(alert.kind, AlertKind::OutOfStock);
        assert_eq!(alert.severity, AlertSeverity::High);
    }

    #[test]
    fn low_stock_severity_depends_on_half_minimum() {
        let medium = StockAlert::for_work(&work(8, 10, None)).unwrap();
        assert_eq!(medium.kind, AlertKind::LowStock);
        assert_eq!(medium.severity, AlertSeverity::Medium);

        let high = StockAlert::for_work(&work(4, 10, None)).unwrap();
        assert_eq!(high.severity, AlertSeverity::High);
    }

    #[test]
    fn excess_stock_is_low_severity() {
        let alert = StockAlert::for_work(&work(120, 10, Some(100))).unwrap();
        assert_eq!(alert.kind, AlertKind::ExcessStock);
        assert_eq!(alert.severity, AlertSeverity::Low);
    }

    #[test]
    fn healthy_work_has_no_alert() {
        assert!(StockAlert::for_work(&work(50, 10, Some(100))).is_none());
    }

    #[test]
    fn alerts_are_sorted_most_severe_first() {
        let works = [work(120, 10, Some(100)), work(8, 10, None), work(0, 5, None)];
        let kinds: Vec<_> = stock_alerts(&works).into_iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::OutOfStock, AlertKind::LowStock, AlertKind::ExcessStock]
        );
    }
}
