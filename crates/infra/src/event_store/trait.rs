use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use strata_core::{AggregateId, TenantId};
use strata_events::{DomainEvent, EventData, EventEnvelope};

/// An event ready to be appended (not yet assigned a sequence number).
///
/// Tenant and stream are given to [`EventStore::append`] alongside the batch;
/// `aggregate_id` is kept so the store can reject events aimed at another stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventData,
}

impl UncommittedEvent {
    /// Encode a typed domain event for persistence.
    pub fn from_domain<E>(event: &E) -> Result<Self, EventStoreError>
    where
        E: DomainEvent,
    {
        let payload = event.event_data().map_err(|e| {
            EventStoreError::Serialization(format!("'{}' payload: {e}", event.event_type()))
        })?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_id: event.aggregate_id().clone(),
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A persisted event (assigned a sequence number).
///
/// Sequence numbers are stream-scoped, start at 1 and have no gaps. The
/// triple `(tenant_id, stream_id, sequence_number)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub stream_id: AggregateId,

    /// Position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl EventRecord {
    /// Convert into the tenant-scoped envelope handed to the bus and projectors.
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope::new(
            self.event_id,
            self.tenant_id.clone(),
            self.stream_id.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved since the caller loaded it. Reload and retry.
    #[error(
        "concurrency conflict on {tenant_id}/{stream_id}: expected version {expected}, found {actual}"
    )]
    Concurrency {
        tenant_id: TenantId,
        stream_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl EventStoreError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::Concurrency { .. })
    }
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, stream_id)`; a stream id is only unique
/// within its tenant.
///
/// ## Append semantics
///
/// - the stream's highest sequence number must equal `expected_version`
///   (0 for a new stream), otherwise `Concurrency` and nothing is written
/// - events get consecutive sequence numbers from `expected_version + 1`
/// - the batch is written atomically; an empty batch is a no-op
///
/// All operations are cancellation-safe: dropping the future before it
/// completes leaves the stream either untouched or fully appended.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
        expected_version: u64,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<EventRecord>, EventStoreError>;

    /// Full stream in ascending sequence order. Unknown streams are empty.
    async fn load_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError>;

    /// Every record of a tenant, in commit order.
    async fn load_tenant_events(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<EventRecord>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
        expected_version: u64,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        (**self)
            .append(tenant_id, stream_id, expected_version, events)
            .await
    }

    async fn load_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        (**self).load_events(tenant_id, stream_id).await
    }

    async fn load_tenant_events(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        (**self).load_tenant_events(tenant_id).await
    }
}

/// Reject batches containing events for a stream other than `stream_id`.
pub(crate) fn check_batch_targets(
    stream_id: &AggregateId,
    events: &[UncommittedEvent],
) -> Result<(), EventStoreError> {
    for (idx, e) in events.iter().enumerate() {
        if &e.aggregate_id != stream_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event at index {idx} targets '{}', not stream '{stream_id}'",
                e.aggregate_id
            )));
        }
    }
    Ok(())
}
