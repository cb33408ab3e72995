//! `strata-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! tenant and aggregate identifiers, the domain error model, and the contract
//! every event-sourced aggregate fulfils.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateBase, AggregateRoot, EventSourced};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
