//! Workflow dispatcher: stock operations as atomic ledger writes.
//!
//! ```text
//! StockOperation
//!   ↓
//! 1. Classify (sub-type table → ledger type + signed quantity)
//!   ↓
//! 2. Begin transaction, resolve work (and partner)
//!   ↓
//! 3. Sufficiency check for exits
//!   ↓
//! 4. Append entry, apply delta, update allocation row, transfer inbound leg
//!   ↓
//! 5. Commit (re-run on transient store failures)
//!   ↓
//! 6. Audit + notifications (post-commit, best-effort)
//! ```

use serde_json::json;
use tracing::{debug, info, instrument};

use bookstock_core::{DomainError, PartnerId, Principal, WorkId};
use bookstock_events::Notification;
use bookstock_inventory::{
    MovementType, OperationExecuted, OperationType, Partner, PartnerReturnPolicy,
    PartnerSaleRecorded, PartnerStock, StockEvent, StockLevelCorrected, StockMovement,
    StockOperation, SubType, Work,
};

use crate::context::{LedgerContext, apply_delta, new_entry};
use crate::error::LedgerResult;
use crate::store::StockStore;

/// Outcome of a committed stock operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub movement: StockMovement,
    /// Inbound leg of a transfer, when a transfer target was given.
    pub transfer_movement: Option<StockMovement>,
    /// Aggregate as of commit.
    pub work: Work,
    pub partner_stock: Option<PartnerStock>,
}

/// Outcome of a committed partner sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerSaleResult {
    pub movement: StockMovement,
    pub partner_stock: PartnerStock,
}

pub struct WorkflowDispatcher<S> {
    ctx: LedgerContext<S>,
}

impl<S> WorkflowDispatcher<S>
where
    S: StockStore,
{
    pub fn new(ctx: LedgerContext<S>) -> Self {
        Self { ctx }
    }

    /// Classify and apply one stock operation.
    #[instrument(
        skip(self, principal, operation),
        fields(
            sub_type = %operation.sub_type,
            work_id = %operation.work_id,
            quantity = operation.quantity
        ),
        err
    )]
    pub async fn execute(
        &self,
        principal: Principal,
        operation: StockOperation,
    ) -> LedgerResult<OperationResult> {
        let signed = operation.signed_quantity()?;
        debug!(
            signed,
            movement_type = %operation.sub_type.classification().movement_type,
            "operation classified"
        );

        let op = &operation;
        let (result, partner) = self
            .ctx
            .transact("execute", move || self.execute_once(principal, op, signed))
            .await?;

        info!(
            movement_id = %result.movement.id,
            stock = result.work.stock(),
            "stock operation committed"
        );

        let event = StockEvent::OperationExecuted(OperationExecuted {
            operation_type: operation.operation_type,
            sub_type: operation.sub_type,
            work_id: operation.work_id,
            work_title: result.work.title().to_string(),
            quantity: result.movement.quantity,
            movement_id: result.movement.id,
            transfer_movement_id: result.transfer_movement.as_ref().map(|m| m.id),
            partner_id: result.movement.partner_id,
            reason: result.movement.reason.clone(),
            new_stock: result.work.stock(),
            occurred_at: result.movement.created_at,
        });
        let notifications = partner
            .map(|p| partner_notice(&p, &operation, &result))
            .into_iter()
            .collect();
        self.ctx.emitter.emit(principal.user_id, &event, notifications);

        Ok(result)
    }

    async fn execute_once(
        &self,
        principal: Principal,
        op: &StockOperation,
        signed: i64,
    ) -> LedgerResult<(OperationResult, Option<Partner>)> {
        let class = op.sub_type.classification();
        let mut tx = self.ctx.store.begin().await?;

        let work = tx
            .find_work(op.work_id)
            .await?
            .ok_or_else(|| DomainError::not_found("work", op.work_id))?;

        let partner = match op.partner_id {
            Some(partner_id) if op.sub_type.affects_partner() => Some(
                tx.find_partner(partner_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("partner", partner_id))?,
            ),
            _ => None,
        };

        if op.operation_type == OperationType::Exit {
            work.ensure_available(signed.abs())?;
        }

        let now = self.ctx.clock.now();
        let unit_price = op.unit_price.unwrap_or(work.price());
        let reference = format!("{}_{}_{}", op.sub_type, op.work_id, now.timestamp_millis());
        let reason = op
            .reason
            .clone()
            .unwrap_or_else(|| format!("{} operation", op.sub_type));
        let source = op
            .source
            .clone()
            .or_else(|| Some(self.ctx.config.default_source_label.clone()));
        let applied = !(op.sub_type == SubType::PartnerReturn
            && self.ctx.config.partner_return_policy == PartnerReturnPolicy::LedgerOnly);

        let movement = StockMovement {
            reason: reason.clone(),
            reference: reference.clone(),
            source: source.clone(),
            destination: op.destination.clone().or_else(|| op.transfer_target.clone()),
            correction_reason: (op.sub_type == SubType::Correction).then(|| reason.clone()),
            partner_id: partner.as_ref().map(|p| p.id),
            applied_to_stock: applied,
            ..new_entry(&work, class.movement_type, signed, unit_price, principal.user_id, now)?
        };
        tx.insert_movement(&movement).await?;

        let mut work = if applied {
            apply_delta(&mut *tx, op.work_id, signed).await?
        } else {
            work
        };

        let partner_stock = match (&partner, op.sub_type) {
            (Some(p), SubType::PartnerDeposit) => Some(
                self.ctx
                    .tracker
                    .upsert_allocation(&mut *tx, p.id, op.work_id, signed.abs())
                    .await?,
            ),
            (Some(p), SubType::PartnerReturn) => Some(
                self.ctx
                    .tracker
                    .upsert_return(&mut *tx, p.id, op.work_id, signed)
                    .await?,
            ),
            _ => None,
        };

        // A transfer naming a target (or just a destination) records both legs.
        let transfer_target = op.transfer_target.as_ref().or(op.destination.as_ref());
        let transfer_movement = match (transfer_target, op.sub_type) {
            (Some(target), SubType::Transfer) => {
                let inbound = StockMovement {
                    reason,
                    reference,
                    source,
                    destination: Some(target.clone()),
                    ..new_entry(
                        &work,
                        MovementType::Transfer,
                        signed.abs(),
                        unit_price,
                        principal.user_id,
                        now,
                    )?
                };
                tx.insert_movement(&inbound).await?;
                work = apply_delta(&mut *tx, op.work_id, inbound.quantity).await?;
                Some(inbound)
            }
            _ => None,
        };

        tx.commit().await?;

        Ok((
            OperationResult {
                movement,
                transfer_movement,
                work,
                partner_stock,
            },
            partner,
        ))
    }

    /// Record a sale a partner made out of its allocation. Central stock is
    /// untouched: the units left it when they were allocated.
    #[instrument(skip(self, principal, client), err)]
    pub async fn record_partner_sale(
        &self,
        principal: Principal,
        partner_id: PartnerId,
        work_id: WorkId,
        quantity: i64,
        client: Option<String>,
    ) -> LedgerResult<PartnerSaleResult> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be a positive number of units").into());
        }

        let client = client.as_deref();
        let result = self
            .ctx
            .transact("record_partner_sale", move || {
                self.partner_sale_once(principal, partner_id, work_id, quantity, client)
            })
            .await?;

        info!(
            movement_id = %result.movement.id,
            available = result.partner_stock.available_quantity(),
            "partner sale committed"
        );

        let event = StockEvent::PartnerSaleRecorded(PartnerSaleRecorded {
            partner_id,
            work_id,
            movement_id: result.movement.id,
            quantity,
            client: client.map(str::to_string),
            available_after: result.partner_stock.available_quantity(),
            occurred_at: result.movement.created_at,
        });
        let notice = Notification::new(
            principal.user_id,
            "PARTNER_SALE",
            "Partner sale recorded",
            format!(
                "{quantity} unit(s) sold by partner; {} remain available",
                result.partner_stock.available_quantity()
            ),
            json!({
                "partnerId": partner_id,
                "workId": work_id,
                "quantity": quantity,
                "movementId": result.movement.id,
            }),
        );
        self.ctx.emitter.emit(principal.user_id, &event, vec![notice]);

        Ok(result)
    }

    async fn partner_sale_once(
        &self,
        principal: Principal,
        partner_id: PartnerId,
        work_id: WorkId,
        quantity: i64,
        client: Option<&str>,
    ) -> LedgerResult<PartnerSaleResult> {
        let mut tx = self.ctx.store.begin().await?;

        let work = tx
            .find_work(work_id)
            .await?
            .ok_or_else(|| DomainError::not_found("work", work_id))?;
        let partner = tx
            .find_partner(partner_id)
            .await?
            .ok_or_else(|| DomainError::not_found("partner", partner_id))?;

        let partner_stock = self
            .ctx
            .tracker
            .record_sale(&mut *tx, partner_id, work_id, quantity)
            .await?;

        let now = self.ctx.clock.now();
        let movement = StockMovement {
            reason: format!("Sale by partner {}", partner.name),
            reference: format!("PARTNER_SALE_{}_{}", work_id, now.timestamp_millis()),
            source: Some(partner.name.clone()),
            destination: client.map(str::to_string),
            partner_id: Some(partner_id),
            applied_to_stock: false,
            ..new_entry(
                &work,
                MovementType::PartnerSale,
                -quantity,
                work.price(),
                principal.user_id,
                now,
            )?
        };
        tx.insert_movement(&movement).await?;
        tx.commit().await?;

        Ok(PartnerSaleResult {
            movement,
            partner_stock,
        })
    }

    /// Reconcile a work's stock with a physical count by appending one
    /// correction entry for the difference.
    #[instrument(skip(self, principal, reason), err)]
    pub async fn correct_stock_level(
        &self,
        principal: Principal,
        work_id: WorkId,
        counted: i64,
        reason: impl Into<String>,
    ) -> LedgerResult<OperationResult> {
        if counted < 0 {
            return Err(DomainError::validation("counted stock cannot be negative").into());
        }

        let reason = reason.into();
        let reason_ref = reason.as_str();
        let (result, previous_stock) = self
            .ctx
            .transact("correct_stock_level", move || {
                self.level_correction_once(principal, work_id, counted, reason_ref)
            })
            .await?;

        info!(
            movement_id = %result.movement.id,
            previous_stock,
            stock = result.work.stock(),
            "stock level corrected"
        );

        let event = StockEvent::StockLevelCorrected(StockLevelCorrected {
            work_id,
            movement_id: result.movement.id,
            previous_stock,
            counted_stock: counted,
            reason,
            occurred_at: result.movement.created_at,
        });
        self.ctx.emitter.emit(principal.user_id, &event, Vec::new());

        Ok(result)
    }

    async fn level_correction_once(
        &self,
        principal: Principal,
        work_id: WorkId,
        counted: i64,
        reason: &str,
    ) -> LedgerResult<(OperationResult, i64)> {
        let mut tx = self.ctx.store.begin().await?;

        let work = tx
            .find_work(work_id)
            .await?
            .ok_or_else(|| DomainError::not_found("work", work_id))?;
        let previous_stock = work.stock();
        let diff = counted - previous_stock;
        if diff == 0 {
            return Err(DomainError::validation(format!(
                "stock already matches the count of {counted}"
            ))
            .into());
        }

        let now = self.ctx.clock.now();
        let movement = StockMovement {
            reason: format!("Stock count correction: {previous_stock} -> {counted}"),
            reference: format!("{}_{}_{}", SubType::Correction, work_id, now.timestamp_millis()),
            source: Some(self.ctx.config.default_source_label.clone()),
            correction_reason: Some(reason.to_string()),
            ..new_entry(
                &work,
                MovementType::Correction,
                diff,
                work.price(),
                principal.user_id,
                now,
            )?
        };
        tx.insert_movement(&movement).await?;
        let work = apply_delta(&mut *tx, work_id, diff).await?;
        tx.commit().await?;

        Ok((
            OperationResult {
                movement,
                transfer_movement: None,
                work,
                partner_stock: None,
            },
            previous_stock,
        ))
    }
}

fn partner_notice(partner: &Partner, op: &StockOperation, result: &OperationResult) -> Notification {
    let quantity = op.quantity;
    let title = result.work.title();
    let available = result
        .partner_stock
        .as_ref()
        .map(PartnerStock::available_quantity);
    let payload = json!({
        "partnerId": partner.id,
        "workId": op.work_id,
        "movementId": result.movement.id,
        "quantity": quantity,
        "availableQuantity": available,
    });

    match op.sub_type {
        SubType::PartnerReturn => Notification::new(
            partner.user_id,
            "STOCK_RETURN",
            "Stock return recorded",
            format!("Your return of {quantity} cop(ies) of '{title}' has been recorded"),
            payload,
        ),
        _ => Notification::new(
            partner.user_id,
            "STOCK_ALLOCATION",
            "Stock allocated",
            format!("{quantity} cop(ies) of '{title}' have been allocated to you"),
            payload,
        ),
    }
}
