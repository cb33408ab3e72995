//! Projections (read model builders).
//!
//! Every projection here is:
//! - **Rebuildable**: state can be recreated from the tenant's event history
//! - **Tenant-isolated**: read models are partitioned by tenant
//! - **Idempotent**: re-delivering an event leaves the read model unchanged

pub mod invitations;
pub mod rebuild;

pub use invitations::{InvitationReadModel, InvitationsProjection};
pub use rebuild::{ProjectionRebuilder, RebuildError, RebuildReport};
