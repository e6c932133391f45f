//! Movement editor/reverser.
//!
//! Past entries are never recomputed from scratch: an edit applies only the
//! difference it introduces, a delete applies the negated quantity, and a
//! compensating correction appends new entries instead of touching the old one.

use serde_json::json;
use tracing::{info, instrument};

use bookstock_core::{DomainError, MovementId, Principal};
use bookstock_events::Notification;
use bookstock_inventory::{
    MovementCorrected, MovementDeleted, MovementPatch, MovementType, MovementUpdated, StockEvent,
    StockMovement, Work, total_amount,
};

use crate::allocation::PartnerEffect;
use crate::context::{LedgerContext, apply_delta};
use crate::error::LedgerResult;
use crate::store::{StockStore, StockTransaction};

/// Outcome of a compensating correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementCorrection {
    /// Entry cancelling the original quantity.
    pub cancel: StockMovement,
    /// Entry carrying the corrected quantity; absent when corrected to zero.
    pub corrected: Option<StockMovement>,
    pub work: Work,
}

pub struct MovementEditor<S> {
    ctx: LedgerContext<S>,
}

impl<S> MovementEditor<S>
where
    S: StockStore,
{
    pub fn new(ctx: LedgerContext<S>) -> Self {
        Self { ctx }
    }

    /// Patch a recorded entry, applying only the stock difference.
    #[instrument(skip(self, principal, patch), err)]
    pub async fn update(
        &self,
        principal: Principal,
        id: MovementId,
        patch: MovementPatch,
    ) -> LedgerResult<StockMovement> {
        let patch = &patch;
        let (original, updated) = self
            .ctx
            .transact("update_movement", move || self.update_once(id, patch))
            .await?;

        info!(
            movement_id = %id,
            previous_quantity = original.quantity,
            quantity = updated.quantity,
            "movement updated"
        );

        let event = StockEvent::MovementUpdated(MovementUpdated {
            movement_id: id,
            previous_work_id: original.work_id,
            work_id: updated.work_id,
            previous_quantity: original.quantity,
            quantity: updated.quantity,
            occurred_at: self.ctx.clock.now(),
        });
        self.ctx.emitter.emit(principal.user_id, &event, Vec::new());

        Ok(updated)
    }

    async fn update_once(
        &self,
        id: MovementId,
        patch: &MovementPatch,
    ) -> LedgerResult<(StockMovement, StockMovement)> {
        let mut tx = self.ctx.store.begin().await?;

        let original = tx
            .find_movement(id)
            .await?
            .ok_or_else(|| DomainError::not_found("movement", id))?;
        let updated = patch.apply_to(&original)?;

        if updated.work_id != original.work_id {
            tx.find_work(updated.work_id)
                .await?
                .ok_or_else(|| DomainError::not_found("work", updated.work_id))?;
        }

        if original.applied_to_stock {
            if updated.work_id != original.work_id {
                apply_delta(&mut *tx, original.work_id, -original.quantity).await?;
                apply_delta(&mut *tx, updated.work_id, updated.quantity).await?;
            } else {
                let diff = updated.quantity - original.quantity;
                if diff != 0 {
                    apply_delta(&mut *tx, updated.work_id, diff).await?;
                }
            }
        }

        self.reconcile_partner(
            &mut *tx,
            PartnerEffect::of(&original),
            PartnerEffect::of(&updated),
        )
        .await?;

        tx.update_movement(&updated).await?;
        tx.commit().await?;
        Ok((original, updated))
    }

    /// Remove an entry recorded within the retention window, reversing its
    /// effect on stock. Older entries must be corrected instead.
    #[instrument(skip(self, principal), err)]
    pub async fn delete(&self, principal: Principal, id: MovementId) -> LedgerResult<StockMovement> {
        let deleted = self
            .ctx
            .transact("delete_movement", move || self.delete_once(id))
            .await?;

        info!(
            movement_id = %id,
            work_id = %deleted.work_id,
            quantity = deleted.quantity,
            "movement deleted"
        );

        let event = StockEvent::MovementDeleted(MovementDeleted {
            movement_id: id,
            work_id: deleted.work_id,
            quantity: deleted.quantity,
            reversed_on_stock: deleted.applied_to_stock,
            occurred_at: self.ctx.clock.now(),
        });
        self.ctx.emitter.emit(principal.user_id, &event, Vec::new());

        Ok(deleted)
    }

    async fn delete_once(&self, id: MovementId) -> LedgerResult<StockMovement> {
        let mut tx = self.ctx.store.begin().await?;

        let entry = tx
            .find_movement(id)
            .await?
            .ok_or_else(|| DomainError::not_found("movement", id))?;

        let window = self.ctx.config.retention_window;
        let age = self.ctx.clock.now() - entry.created_at;
        if age > window {
            return Err(DomainError::RetentionWindowExceeded {
                age_days: age.num_days(),
                window_days: window.num_days(),
            }
            .into());
        }

        if entry.applied_to_stock {
            apply_delta(&mut *tx, entry.work_id, -entry.quantity).await?;
        }
        self.reconcile_partner(&mut *tx, PartnerEffect::of(&entry), None)
            .await?;

        tx.delete_movement(id).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Append a cancel entry and a corrected entry for `id`, applying the
    /// net difference once. The original entry is left as recorded.
    #[instrument(skip(self, principal, reason), err)]
    pub async fn correct_movement(
        &self,
        principal: Principal,
        id: MovementId,
        corrected_quantity: i64,
        reason: impl Into<String>,
    ) -> LedgerResult<MovementCorrection> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("a correction needs a reason").into());
        }

        let reason_ref = reason.as_str();
        let (original, correction) = self
            .ctx
            .transact("correct_movement", move || {
                self.correct_once(principal, id, corrected_quantity, reason_ref)
            })
            .await?;

        info!(
            movement_id = %id,
            original_quantity = original.quantity,
            corrected_quantity,
            stock = correction.work.stock(),
            "movement corrected"
        );

        let event = StockEvent::MovementCorrected(MovementCorrected {
            original_movement_id: id,
            cancel_movement_id: correction.cancel.id,
            corrected_movement_id: correction.corrected.as_ref().map(|m| m.id),
            work_id: original.work_id,
            original_quantity: original.quantity,
            corrected_quantity,
            reason: reason.clone(),
            occurred_at: correction.cancel.created_at,
        });
        let notice = Notification::new(
            principal.user_id,
            "STOCK_CORRECTION",
            "Stock movement corrected",
            format!(
                "Movement {} corrected from {} to {corrected_quantity}: {reason}",
                original.reference, original.quantity
            ),
            json!({
                "movementId": id,
                "workId": original.work_id,
                "cancelMovementId": correction.cancel.id,
                "stock": correction.work.stock(),
            }),
        );
        self.ctx.emitter.emit(principal.user_id, &event, vec![notice]);

        Ok(correction)
    }

    async fn correct_once(
        &self,
        principal: Principal,
        id: MovementId,
        corrected_quantity: i64,
        reason: &str,
    ) -> LedgerResult<(StockMovement, MovementCorrection)> {
        let mut tx = self.ctx.store.begin().await?;

        let original = tx
            .find_movement(id)
            .await?
            .ok_or_else(|| DomainError::not_found("movement", id))?;
        let work = tx
            .find_work(original.work_id)
            .await?
            .ok_or_else(|| DomainError::not_found("work", original.work_id))?;

        if let Some(sign) = original.movement_type.fixed_sign() {
            if corrected_quantity != 0 && corrected_quantity.signum() != sign {
                return Err(DomainError::validation(format!(
                    "a {} entry cannot be corrected to {corrected_quantity}",
                    original.movement_type
                ))
                .into());
            }
        }

        let now = self.ctx.clock.now();
        let compensating = |quantity: i64,
                            reference: String,
                            label: &str|
         -> LedgerResult<StockMovement> {
            Ok(StockMovement {
                id: MovementId::new(),
                work_id: original.work_id,
                movement_type: MovementType::Correction,
                quantity,
                reason: format!("{label} of movement {}", original.reference),
                reference,
                source: original.source.clone(),
                destination: original.destination.clone(),
                unit_price: original.unit_price,
                total_amount: total_amount(quantity, original.unit_price)?,
                is_correction: true,
                correction_reason: Some(reason.to_string()),
                performed_by: principal.user_id,
                partner_id: original.partner_id,
                applied_to_stock: original.applied_to_stock,
                created_at: now,
            })
        };

        let cancel = compensating(
            -original.quantity,
            format!("CANCEL_{}", original.reference),
            "Cancellation",
        )?;
        tx.insert_movement(&cancel).await?;

        let corrected = if corrected_quantity != 0 {
            let entry = compensating(
                corrected_quantity,
                format!("CORRECTED_{}", original.reference),
                "Correction",
            )?;
            tx.insert_movement(&entry).await?;
            Some(entry)
        } else {
            None
        };

        let net = corrected_quantity - original.quantity;
        let work = if original.applied_to_stock && net != 0 {
            apply_delta(&mut *tx, original.work_id, net).await?
        } else {
            work
        };

        // The allocation row follows the corrected quantity.
        let before = PartnerEffect::of(&original);
        let after = before.map(|effect| PartnerEffect {
            amount: corrected_quantity.abs(),
            ..effect
        });
        self.reconcile_partner(&mut *tx, before, after).await?;

        tx.commit().await?;
        Ok((
            original,
            MovementCorrection {
                cancel,
                corrected,
                work,
            },
        ))
    }

    async fn reconcile_partner(
        &self,
        tx: &mut dyn StockTransaction,
        before: Option<PartnerEffect>,
        after: Option<PartnerEffect>,
    ) -> LedgerResult<()> {
        let tracker = &self.ctx.tracker;
        match (before, after) {
            (Some(b), Some(a)) if b.key == a.key && b.counter == a.counter => {
                if a.amount != b.amount {
                    tracker.reconcile(tx, a.key, a.counter, a.amount - b.amount).await?;
                }
            }
            (before, after) => {
                if let Some(b) = before {
                    tracker.reconcile(tx, b.key, b.counter, -b.amount).await?;
                }
                if let Some(a) = after {
                    tracker.reconcile(tx, a.key, a.counter, a.amount).await?;
                }
            }
        }
        Ok(())
    }
}
