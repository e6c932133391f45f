//! Paginated ledger listings.

use serde::{Deserialize, Serialize};

use bookstock_inventory::StockMovement;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

/// Pagination parameters for ledger listings.
///
/// Only built through [`Pagination::new`] (deserialization included), so the
/// limit is always capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationParams")]
pub struct Pagination {
    limit: u32,
    /// 0-based.
    offset: u32,
}

#[derive(Deserialize)]
struct PaginationParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(params.limit, params.offset)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// One page of ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<StockMovement>,
    /// Entries matching the filter across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<StockMovement>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (movements.len() as u64) < total;
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_is_capped() {
        assert_eq!(Pagination::new(None, None).limit(), 50);
        assert_eq!(Pagination::new(Some(5_000), Some(3)).limit(), 1000);
        assert_eq!(Pagination::new(Some(5_000), Some(3)).offset(), 3);
    }

    #[test]
    fn deserialized_limit_is_capped_too() {
        let pagination: Pagination = serde_json::from_str(r#"{"limit": 5000}"#).unwrap();
        assert_eq!(pagination.limit(), 1000);
        assert_eq!(pagination.offset(), 0);

        let pagination: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(pagination, Pagination::default());
    }

    #[test]
    fn has_more_accounts_for_offset() {
        let page = MovementPage::new(vec![], 10, Pagination::new(Some(5), Some(10)));
        assert!(!page.has_more);
        let page = MovementPage::new(vec![], 10, Pagination::new(Some(5), Some(0)));
        assert!(page.has_more);
    }
}
