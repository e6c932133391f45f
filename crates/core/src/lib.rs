//! `bookstock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the business error model and the acting principal.

pub mod entity;
pub mod error;
pub mod id;
pub mod principal;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{MovementId, PartnerId, UserId, WorkId};
pub use principal::{Principal, Role};
