//! Append-only event store boundary.
//!
//! Tenant-scoped event streams behind the [`EventStore`] trait, with an
//! in-memory backend for tests/dev and a Postgres backend for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use async_trait::async_trait;

use strata_core::{AggregateId, TenantId};
use strata_events::EventBus;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventRecord, EventStore, EventStoreError, UncommittedEvent};

/// Adapter that publishes committed events to an [`EventBus`] after a successful append.
///
/// Ordering invariant: **publish happens only after append succeeds**, one
/// envelope per record, in sequence order. Publishing cannot fail the append;
/// projector failures are handled by the bus.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus,
{
    async fn append(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
        expected_version: u64,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        // 1) Append (durable step)
        let committed = self
            .store
            .append(tenant_id, stream_id, expected_version, events)
            .await?;

        // 2) Publish committed events
        for record in &committed {
            self.bus.publish(&record.to_envelope()).await;
        }

        Ok(committed)
    }

    async fn load_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        self.store.load_events(tenant_id, stream_id).await
    }

    async fn load_tenant_events(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        self.store.load_tenant_events(tenant_id).await
    }
}
