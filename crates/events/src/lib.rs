//! `strata-events`: event, command and tenant mechanics.
//!
//! Shared vocabulary between domain crates and infrastructure: what an event
//! is and how it is encoded/decoded, how commands are named, how the tenant
//! travels with a request, and how committed events fan out to projectors.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod registry;
pub mod tenant;

pub use bus::EventBus;
pub use command::{AsAny, Command};
pub use envelope::EventEnvelope;
pub use event::{DomainEvent, EventData, EventDataError, EventPayload};
pub use in_memory_bus::InMemoryEventBus;
pub use projection::{Projector, ResettableProjector};
pub use registry::{DecodeError, EventRegistry};
pub use tenant::{RequestContext, TenantContextMissing, TenantScoped};
