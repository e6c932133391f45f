//! Postgres-backed stock store.
//!
//! ## Concurrency
//!
//! The sufficiency check and the decrement are one conditional statement:
//!
//! ```sql
//! UPDATE works SET stock = stock + $2, physical_stock = physical_stock + $2
//! WHERE id = $1 AND stock + $2 >= 0
//! RETURNING ...
//! ```
//!
//! so concurrent exits on the same work can never drive stock negative. Ledger
//! entries and allocation rows read inside a transaction are locked with
//! `FOR UPDATE`. Allocation rows are updated read-modify-write, so
//! `lock_partner_stock` inserts a missing row (`ON CONFLICT DO NOTHING`)
//! before locking it: the first allocation of a work to a partner is
//! serialised like every later one.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | Io / Tls / PoolTimedOut / PoolClosed / WorkerCrashed | n/a | `Unavailable` |
//! | ColumnNotFound / ColumnDecode / Decode | n/a | `Corrupt` |
//! | Other | n/a | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use bookstock_core::{MovementId, PartnerId, UserId, WorkId};
use bookstock_inventory::{
    MovementFilter, MovementStatistics, MovementType, Partner, PartnerStock, PartnerStockKey,
    StockMovement, TypeStatistics, Work,
};

use super::page::{MovementPage, Pagination};
use super::r#trait::{DeltaOutcome, StockStore, StockTransaction};
use crate::error::StoreError;

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// SQLSTATE raised when `stock + delta` leaves the BIGINT range.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

const WORK_COLUMNS: &str = "id, title, price, stock, physical_stock, min_stock, max_stock";

const MOVEMENT_COLUMNS: &str = "id, work_id, movement_type, quantity, reason, reference, source, \
     destination, unit_price, total_amount, is_correction, correction_reason, performed_by, \
     partner_id, applied_to_stock, created_at";

/// Postgres-backed stock store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Register a catalogued work (catalog management is external).
    #[instrument(skip(self, work), fields(work_id = %work.id_typed()), err)]
    pub async fn upsert_work(&self, work: &Work) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO works (id, title, price, stock, physical_stock, min_stock, max_stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
               SET title = EXCLUDED.title,
                   price = EXCLUDED.price,
                   min_stock = EXCLUDED.min_stock,
                   max_stock = EXCLUDED.max_stock
            "#,
        )
        .bind(work.id_typed().as_uuid())
        .bind(work.title())
        .bind(work.price())
        .bind(work.stock())
        .bind(work.physical_stock())
        .bind(work.min_stock())
        .bind(work.max_stock())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_work", e))?;
        Ok(())
    }

    #[instrument(skip(self, partner), fields(partner_id = %partner.id), err)]
    pub async fn upsert_partner(&self, partner: &Partner) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO partners (id, user_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET user_id = EXCLUDED.user_id, name = EXCLUDED.name
            "#,
        )
        .bind(partner.id.as_uuid())
        .bind(partner.user_id.as_uuid())
        .bind(&partner.name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_partner", e))?;
        Ok(())
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self), fields(work_id = %id), err)]
    async fn work(&self, id: WorkId) -> Result<Option<Work>, StoreError> {
        let row = sqlx::query(&format!("SELECT {WORK_COLUMNS} FROM works WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_work", e))?;
        row.as_ref().map(work_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn works(&self) -> Result<Vec<Work>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {WORK_COLUMNS} FROM works ORDER BY title ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_works", e))?;
        rows.iter().map(work_from_row).collect()
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_movement", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(limit = pagination.limit(), offset = pagination.offset()), err)]
    async fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stock_movements WHERE TRUE");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?
            .try_get(0)
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE TRUE"
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(pagination.limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset()));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;
        let movements = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage::new(movements, total.max(0) as u64, pagination))
    }

    #[instrument(skip(self, filter), err)]
    async fn movement_statistics(
        &self,
        filter: &MovementFilter,
    ) -> Result<MovementStatistics, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT movement_type,
                   COUNT(*) AS count,
                   COALESCE(SUM(quantity), 0)::BIGINT AS total_quantity,
                   COALESCE(SUM(GREATEST(quantity, 0)), 0)::BIGINT AS inbound,
                   COALESCE(SUM(GREATEST(-quantity, 0)), 0)::BIGINT AS outbound
            FROM stock_movements
            WHERE TRUE"#,
        );
        push_filter(&mut query, filter);
        query.push(" GROUP BY movement_type");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("movement_statistics", e))?;

        let mut stats = MovementStatistics::default();
        for row in &rows {
            let movement_type = parse_movement_type(row)?;
            let count: i64 = row.try_get("count").map_err(|e| map_sqlx_error("movement_statistics", e))?;
            let total_quantity: i64 = row
                .try_get("total_quantity")
                .map_err(|e| map_sqlx_error("movement_statistics", e))?;
            let inbound: i64 = row.try_get("inbound").map_err(|e| map_sqlx_error("movement_statistics", e))?;
            let outbound: i64 = row.try_get("outbound").map_err(|e| map_sqlx_error("movement_statistics", e))?;

            stats.total_movements += count.max(0) as u64;
            stats.total_inbound += inbound;
            stats.total_outbound += outbound;
            stats.by_type.push(TypeStatistics {
                movement_type,
                count: count.max(0) as u64,
                total_quantity,
            });
        }
        stats.by_type.sort_by_key(|t| t.movement_type);
        Ok(stats)
    }

    #[instrument(skip(self), fields(partner_id = %partner_id), err)]
    async fn partner_stocks(&self, partner_id: PartnerId) -> Result<Vec<PartnerStock>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT partner_id, work_id, allocated_quantity, sold_quantity, returned_quantity
            FROM partner_stocks
            WHERE partner_id = $1
            ORDER BY work_id ASC
            "#,
        )
        .bind(partner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_partner_stocks", e))?;
        rows.iter().map(partner_stock_from_row).collect()
    }
}

/// A live database transaction; sqlx rolls it back when dropped uncommitted.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    async fn find_work(&mut self, id: WorkId) -> Result<Option<Work>, StoreError> {
        let row = sqlx::query(&format!("SELECT {WORK_COLUMNS} FROM works WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_work", e))?;
        row.as_ref().map(work_from_row).transpose()
    }

    #[instrument(skip(self), fields(work_id = %id), err)]
    async fn apply_delta(&mut self, id: WorkId, delta: i64) -> Result<DeltaOutcome, StoreError> {
        let updated = sqlx::query(&format!(
            r#"
            UPDATE works
               SET stock = stock + $2,
                   physical_stock = physical_stock + $2
             WHERE id = $1 AND stock + $2 >= 0
            RETURNING {WORK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await;

        let updated = match updated {
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) => {
                return Ok(DeltaOutcome::Overflow);
            }
            other => other.map_err(|e| map_sqlx_error("apply_delta", e))?,
        };

        if let Some(row) = updated {
            return Ok(DeltaOutcome::Applied(work_from_row(&row)?));
        }

        let current = sqlx::query("SELECT stock FROM works WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apply_delta", e))?;

        match current {
            Some(row) => Ok(DeltaOutcome::Insufficient {
                available: row.try_get("stock").map_err(|e| map_sqlx_error("apply_delta", e))?,
            }),
            None => Ok(DeltaOutcome::Missing),
        }
    }

    async fn find_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, StoreError> {
        let row = sqlx::query("SELECT id, user_id, name FROM partners WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_partner", e))?;

        row.map(|row| -> Result<Partner, StoreError> {
            let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("find_partner", e))?;
            let user_id: Uuid = row.try_get("user_id").map_err(|e| map_sqlx_error("find_partner", e))?;
            let name: String = row.try_get("name").map_err(|e| map_sqlx_error("find_partner", e))?;
            Ok(Partner::new(
                PartnerId::from_uuid(id),
                UserId::from_uuid(user_id),
                name,
            ))
        })
        .transpose()
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_movement", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id, work_id = %movement.work_id), err)]
    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, work_id, movement_type, quantity, reason, reference, source, destination,
                unit_price, total_amount, is_correction, correction_reason, performed_by,
                partner_id, applied_to_stock, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.work_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(&movement.source)
        .bind(&movement.destination)
        .bind(movement.unit_price)
        .bind(movement.total_amount)
        .bind(movement.is_correction)
        .bind(&movement.correction_reason)
        .bind(movement.performed_by.as_uuid())
        .bind(movement.partner_id.map(Uuid::from))
        .bind(movement.applied_to_stock)
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id), err)]
    async fn update_movement(&mut self, movement: &StockMovement) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stock_movements
               SET work_id = $2,
                   movement_type = $3,
                   quantity = $4,
                   reason = $5,
                   reference = $6,
                   source = $7,
                   destination = $8,
                   unit_price = $9,
                   total_amount = $10,
                   is_correction = $11,
                   correction_reason = $12
             WHERE id = $1
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.work_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(&movement.source)
        .bind(&movement.destination)
        .bind(movement.unit_price)
        .bind(movement.total_amount)
        .bind(movement.is_correction)
        .bind(&movement.correction_reason)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_movement", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "movement {} vanished during update",
                movement.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn delete_movement(&mut self, id: MovementId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM stock_movements WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_movement", e))?;
        Ok(())
    }

    async fn find_partner_stock(
        &mut self,
        key: PartnerStockKey,
    ) -> Result<Option<PartnerStock>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT partner_id, work_id, allocated_quantity, sold_quantity, returned_quantity
            FROM partner_stocks
            WHERE partner_id = $1 AND work_id = $2
            FOR UPDATE
            "#,
        )
        .bind(key.partner_id.as_uuid())
        .bind(key.work_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_partner_stock", e))?;
        row.as_ref().map(partner_stock_from_row).transpose()
    }

    #[instrument(skip(self), fields(partner_id = %key.partner_id, work_id = %key.work_id), err)]
    async fn lock_partner_stock(&mut self, key: PartnerStockKey) -> Result<PartnerStock, StoreError> {
        // A missing row has nothing for FOR UPDATE to lock, so two writers
        // could both start from zero. Materialise it first; a concurrent
        // insert of the same key blocks here until the other side ends.
        sqlx::query(
            r#"
            INSERT INTO partner_stocks (
                partner_id, work_id, allocated_quantity, sold_quantity, returned_quantity,
                available_quantity
            )
            VALUES ($1, $2, 0, 0, 0, 0)
            ON CONFLICT (partner_id, work_id) DO NOTHING
            "#,
        )
        .bind(key.partner_id.as_uuid())
        .bind(key.work_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_partner_stock", e))?;

        self.find_partner_stock(key).await?.ok_or_else(|| {
            StoreError::Corrupt(format!(
                "partner_stocks row {}/{} vanished after insert",
                key.partner_id, key.work_id
            ))
        })
    }

    async fn save_partner_stock(&mut self, row: &PartnerStock) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO partner_stocks (
                partner_id, work_id, allocated_quantity, sold_quantity, returned_quantity,
                available_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (partner_id, work_id) DO UPDATE
               SET allocated_quantity = EXCLUDED.allocated_quantity,
                   sold_quantity = EXCLUDED.sold_quantity,
                   returned_quantity = EXCLUDED.returned_quantity,
                   available_quantity = EXCLUDED.available_quantity
            "#,
        )
        .bind(row.partner_id().as_uuid())
        .bind(row.work_id().as_uuid())
        .bind(row.allocated_quantity())
        .bind(row.sold_quantity())
        .bind(row.returned_quantity())
        .bind(row.available_quantity())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_partner_stock", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &MovementFilter) {
    if let Some(work_id) = filter.work_id {
        query.push(" AND work_id = ").push_bind(Uuid::from(work_id));
    }
    if let Some(movement_type) = filter.movement_type {
        query.push(" AND movement_type = ").push_bind(movement_type.as_str());
    }
    if let Some(partner_id) = filter.partner_id {
        query.push(" AND partner_id = ").push_bind(Uuid::from(partner_id));
    }
    if let Some(from) = filter.period.from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.period.to {
        query.push(" AND created_at < ").push_bind(to);
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure / deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => StoreError::Corrupt(format!("{operation}: {err}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn work_from_row(row: &PgRow) -> Result<Work, StoreError> {
    let get = |e| map_sqlx_error("work_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    Ok(Work::restore(
        WorkId::from_uuid(id),
        row.try_get("title").map_err(get)?,
        row.try_get("price").map_err(get)?,
        row.try_get("stock").map_err(get)?,
        row.try_get("physical_stock").map_err(get)?,
        row.try_get("min_stock").map_err(get)?,
        row.try_get("max_stock").map_err(get)?,
    ))
}

fn parse_movement_type(row: &PgRow) -> Result<MovementType, StoreError> {
    let raw: String = row
        .try_get("movement_type")
        .map_err(|e| map_sqlx_error("movement_row", e))?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown movement type '{raw}'")))
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StoreError> {
    let get = |e| map_sqlx_error("movement_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let work_id: Uuid = row.try_get("work_id").map_err(get)?;
    let performed_by: Uuid = row.try_get("performed_by").map_err(get)?;
    let partner_id: Option<Uuid> = row.try_get("partner_id").map_err(get)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get)?;

    Ok(StockMovement {
        id: MovementId::from_uuid(id),
        work_id: WorkId::from_uuid(work_id),
        movement_type: parse_movement_type(row)?,
        quantity: row.try_get("quantity").map_err(get)?,
        reason: row.try_get("reason").map_err(get)?,
        reference: row.try_get("reference").map_err(get)?,
        source: row.try_get("source").map_err(get)?,
        destination: row.try_get("destination").map_err(get)?,
        unit_price: row.try_get("unit_price").map_err(get)?,
        total_amount: row.try_get("total_amount").map_err(get)?,
        is_correction: row.try_get("is_correction").map_err(get)?,
        correction_reason: row.try_get("correction_reason").map_err(get)?,
        performed_by: UserId::from_uuid(performed_by),
        partner_id: partner_id.map(PartnerId::from_uuid),
        applied_to_stock: row.try_get("applied_to_stock").map_err(get)?,
        created_at,
    })
}

fn partner_stock_from_row(row: &PgRow) -> Result<PartnerStock, StoreError> {
    let get = |e| map_sqlx_error("partner_stock_row", e);
    let partner_id: Uuid = row.try_get("partner_id").map_err(get)?;
    let work_id: Uuid = row.try_get("work_id").map_err(get)?;
    Ok(PartnerStock::restore(
        PartnerId::from_uuid(partner_id),
        WorkId::from_uuid(work_id),
        row.try_get("allocated_quantity").map_err(get)?,
        row.try_get("sold_quantity").map_err(get)?,
        row.try_get("returned_quantity").map_err(get)?,
    ))
}
