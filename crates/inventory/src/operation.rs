//! Operation classification: caller-facing sub-types to signed ledger entries.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use bookstock_core::{DomainError, DomainResult, PartnerId, WorkId};

use crate::movement::MovementType;

/// Direction requested by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Entry,
    Exit,
}

impl FromStr for OperationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(OperationType::Entry),
            "EXIT" => Ok(OperationType::Exit),
            other => Err(DomainError::invalid_operation(format!(
                "unknown operation type '{other}'"
            ))),
        }
    }
}

/// Business sub-type of a stock operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubType {
    /// Restocking from the printer.
    #[serde(rename = "APPROVISIONNEMENT")]
    Restock,
    #[serde(rename = "RETOUR_PARTENAIRE")]
    PartnerReturn,
    #[serde(rename = "CORRECTION")]
    Correction,
    #[serde(rename = "VENTE_DIRECTE")]
    DirectSale,
    /// Consignment of stock to a partner.
    #[serde(rename = "DEPOT_PARTENAIRE")]
    PartnerDeposit,
    #[serde(rename = "PERTE")]
    Loss,
    #[serde(rename = "TRANSFERT")]
    Transfer,
}

/// How the caller's quantity becomes a signed ledger quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
    /// Signed quantity is taken as given.
    AsSupplied,
}

/// Natural direction of a sub-type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Either,
}

/// One row of the fixed classification table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Classification {
    pub sub_type: SubType,
    pub movement_type: MovementType,
    pub sign: Sign,
    pub direction: Direction,
}

const fn row(
    sub_type: SubType,
    movement_type: MovementType,
    sign: Sign,
    direction: Direction,
) -> Classification {
    Classification {
        sub_type,
        movement_type,
        sign,
        direction,
    }
}

/// Sub-type → ledger type / sign. Fixed; never inferred at runtime.
pub const CLASSIFICATION_TABLE: [Classification; 7] = [
    row(SubType::Restock, MovementType::Inbound, Sign::Positive, Direction::Inbound),
    row(SubType::PartnerReturn, MovementType::PartnerReturn, Sign::Positive, Direction::Inbound),
    row(SubType::Correction, MovementType::Correction, Sign::AsSupplied, Direction::Either),
    row(SubType::DirectSale, MovementType::DirectSale, Sign::Negative, Direction::Outbound),
    row(SubType::PartnerDeposit, MovementType::PartnerAllocation, Sign::Negative, Direction::Outbound),
    row(SubType::Loss, MovementType::Damaged, Sign::Negative, Direction::Outbound),
    row(SubType::Transfer, MovementType::Transfer, Sign::Negative, Direction::Outbound),
];

impl SubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Restock => "APPROVISIONNEMENT",
            SubType::PartnerReturn => "RETOUR_PARTENAIRE",
            SubType::Correction => "CORRECTION",
            SubType::DirectSale => "VENTE_DIRECTE",
            SubType::PartnerDeposit => "DEPOT_PARTENAIRE",
            SubType::Loss => "PERTE",
            SubType::Transfer => "TRANSFERT",
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            SubType::Restock => CLASSIFICATION_TABLE[0],
            SubType::PartnerReturn => CLASSIFICATION_TABLE[1],
            SubType::Correction => CLASSIFICATION_TABLE[2],
            SubType::DirectSale => CLASSIFICATION_TABLE[3],
            SubType::PartnerDeposit => CLASSIFICATION_TABLE[4],
            SubType::Loss => CLASSIFICATION_TABLE[5],
            SubType::Transfer => CLASSIFICATION_TABLE[6],
        }
    }

    /// Sub-types that update a partner's allocation row.
    pub fn affects_partner(&self) -> bool {
        matches!(self, SubType::PartnerDeposit | SubType::PartnerReturn)
    }
}

impl core::fmt::Display for SubType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CLASSIFICATION_TABLE
            .iter()
            .map(|c| c.sub_type)
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::invalid_operation(format!("unknown sub-type '{s}'")))
    }
}

/// A caller's stock operation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    pub operation_type: OperationType,
    pub sub_type: SubType,
    pub work_id: WorkId,
    /// Positive for fixed-sign sub-types; signed for corrections.
    pub quantity: i64,
    pub partner_id: Option<PartnerId>,
    pub unit_price: Option<i64>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub reason: Option<String>,
    /// Transfer target; when set, a transfer also records its inbound leg.
    pub transfer_target: Option<String>,
}

impl StockOperation {
    pub fn new(
        operation_type: OperationType,
        sub_type: SubType,
        work_id: WorkId,
        quantity: i64,
    ) -> Self {
        Self {
            operation_type,
            sub_type,
            work_id,
            quantity,
            partner_id: None,
            unit_price: None,
            source: None,
            destination: None,
            reason: None,
            transfer_target: None,
        }
    }

    pub fn with_partner(mut self, partner_id: PartnerId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_unit_price(mut self, unit_price: i64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_transfer_target(mut self, target: impl Into<String>) -> Self {
        self.transfer_target = Some(target.into());
        self
    }

    /// Validate the request against the classification table and return the
    /// signed ledger quantity.
    pub fn signed_quantity(&self) -> DomainResult<i64> {
        let class = self.sub_type.classification();

        match (class.direction, self.operation_type) {
            (Direction::Inbound, OperationType::Exit) | (Direction::Outbound, OperationType::Entry) => {
                return Err(DomainError::invalid_operation(format!(
                    "{} cannot be requested as {:?}",
                    self.sub_type, self.operation_type
                )));
            }
            _ => {}
        }

        if let Some(price) = self.unit_price {
            if price <= 0 {
                return Err(DomainError::validation("unit price must be positive"));
            }
        }

        match class.sign {
            Sign::AsSupplied => {
                if self.quantity == 0 {
                    return Err(DomainError::validation("quantity cannot be zero"));
                }
                Ok(self.quantity)
            }
            Sign::Positive | Sign::Negative if self.quantity <= 0 => Err(DomainError::validation(
                "quantity must be a positive number of units",
            )),
            Sign::Positive => Ok(self.quantity),
            Sign::Negative => Ok(-self.quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(operation_type: OperationType, sub_type: SubType, quantity: i64) -> StockOperation {
        StockOperation::new(operation_type, sub_type, WorkId::new(), quantity)
    }

    #[test]
    fn table_covers_every_sub_type_once() {
        for (idx, row) in CLASSIFICATION_TABLE.iter().enumerate() {
            assert_eq!(row.sub_type.classification(), *row, "row {idx}");
        }
    }

    #[test]
    fn sub_types_parse_from_wire_names() {
        let parsed: SubType = "DEPOT_PARTENAIRE".parse().unwrap();
        assert_eq!(parsed, SubType::PartnerDeposit);
        assert_eq!(parsed.classification().movement_type, MovementType::PartnerAllocation);

        let err = "DON".parse::<SubType>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidOperation(_)));
    }

    #[test]
    fn outbound_sub_types_are_negated() {
        for sub_type in [SubType::DirectSale, SubType::PartnerDeposit, SubType::Loss, SubType::Transfer] {
            assert_eq!(op(OperationType::Exit, sub_type, 6).signed_quantity().unwrap(), -6);
        }
    }

    #[test]
    fn inbound_sub_types_stay_positive() {
        for sub_type in [SubType::Restock, SubType::PartnerReturn] {
            assert_eq!(op(OperationType::Entry, sub_type, 6).signed_quantity().unwrap(), 6);
        }
    }

    #[test]
    fn correction_keeps_the_supplied_sign() {
        assert_eq!(
            op(OperationType::Exit, SubType::Correction, -3).signed_quantity().unwrap(),
            -3
        );
        assert_eq!(
            op(OperationType::Entry, SubType::Correction, 3).signed_quantity().unwrap(),
            3
        );
        assert!(matches!(
            op(OperationType::Entry, SubType::Correction, 0).signed_quantity(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn fixed_sign_sub_types_reject_non_positive_quantities() {
        for quantity in [0, -5] {
            assert!(matches!(
                op(OperationType::Exit, SubType::DirectSale, quantity).signed_quantity(),
                Err(DomainError::Validation(_))
            ));
        }
    }

    #[test]
    fn direction_mismatch_is_an_invalid_operation() {
        assert!(matches!(
            op(OperationType::Entry, SubType::DirectSale, 1).signed_quantity(),
            Err(DomainError::InvalidOperation(_))
        ));
        assert!(matches!(
            op(OperationType::Exit, SubType::Restock, 1).signed_quantity(),
            Err(DomainError::InvalidOperation(_))
        ));
    }

    #[test]
    fn explicit_unit_price_must_be_positive() {
        let request = op(OperationType::Entry, SubType::Restock, 1).with_unit_price(0);
        assert!(matches!(request.signed_quantity(), Err(DomainError::Validation(_))));
    }
}
