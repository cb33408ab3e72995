//! Generic event-sourced repository.
//!
//! Loads an aggregate by replaying its stream and saves it by appending the
//! events it raised since it was loaded:
//!
//! ```text
//! get_by_id:  load_events ─→ registry.decode (per record) ─→ reconstitute
//! save:       uncommitted ─→ encode ─→ append(expected = version − uncommitted) ─→ mark committed
//! ```
//!
//! No retries: a concurrency conflict is returned to the caller, who reloads.

use std::sync::Arc;

use thiserror::Error;

use strata_core::{AggregateId, AggregateRoot, DomainError, TenantId};
use strata_events::{DecodeError, DomainEvent, EventDataError, EventRegistry};

use crate::event_store::{EventRecord, EventStore, EventStoreError, UncommittedEvent};

/// Builds an aggregate from its decoded history (never empty).
pub type Reconstitute<A> =
    fn(AggregateId, Vec<<A as AggregateRoot>::Event>) -> Result<A, DomainError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{aggregate_type} '{id}' not found")]
    NotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// A stored tag has no decoder registered. Deployment bug, not bad data.
    #[error("stream '{stream_id}' contains unknown event type '{event_type}'")]
    UnknownEventType {
        stream_id: AggregateId,
        event_type: String,
    },

    #[error("cannot decode event #{sequence_number} ('{event_type}') of stream '{stream_id}': {source}")]
    Decode {
        stream_id: AggregateId,
        sequence_number: u64,
        event_type: String,
        #[source]
        source: EventDataError,
    },

    /// The backend returned records that break stream invariants.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::Store(e) if e.is_concurrency_conflict())
    }
}

/// Repository for one aggregate type over any [`EventStore`].
pub struct EventSourcedRepository<A, S>
where
    A: AggregateRoot,
{
    store: S,
    registry: Arc<EventRegistry<A::Event>>,
    reconstitute: Reconstitute<A>,
    aggregate_type: &'static str,
}

impl<A, S> EventSourcedRepository<A, S>
where
    A: AggregateRoot,
    A::Event: DomainEvent,
    S: EventStore,
{
    pub fn new(
        store: S,
        registry: Arc<EventRegistry<A::Event>>,
        reconstitute: Reconstitute<A>,
        aggregate_type: &'static str,
    ) -> Self {
        Self {
            store,
            registry,
            reconstitute,
            aggregate_type,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load and replay the aggregate `id` of `tenant_id`.
    pub async fn get_by_id(
        &self,
        tenant_id: &TenantId,
        id: &AggregateId,
    ) -> Result<A, RepositoryError> {
        let records = self.store.load_events(tenant_id, id).await?;

        if records.is_empty() {
            return Err(RepositoryError::NotFound {
                aggregate_type: self.aggregate_type,
                id: id.clone(),
            });
        }
        validate_loaded_stream(tenant_id, id, &records)?;

        let mut history = Vec::with_capacity(records.len());
        for record in records {
            let sequence_number = record.sequence_number;
            let event = self
                .registry
                .decode(&record.event_type, record.payload)
                .map_err(|e| match e {
                    DecodeError::UnknownEventType(event_type) => RepositoryError::UnknownEventType {
                        stream_id: id.clone(),
                        event_type,
                    },
                    DecodeError::Data { event_type, source } => RepositoryError::Decode {
                        stream_id: id.clone(),
                        sequence_number,
                        event_type,
                        source,
                    },
                })?;
            history.push(event);
        }

        tracing::debug!(
            %tenant_id,
            aggregate_type = self.aggregate_type,
            aggregate_id = %id,
            events = history.len(),
            "rehydrating aggregate"
        );
        Ok((self.reconstitute)(id.clone(), history)?)
    }

    /// Append the aggregate's uncommitted events.
    ///
    /// On success the buffer is cleared and the committed records are returned;
    /// on any error the aggregate is left exactly as it was. Saving a clean
    /// aggregate does nothing.
    pub async fn save(
        &self,
        tenant_id: &TenantId,
        aggregate: &mut A,
    ) -> Result<Vec<EventRecord>, RepositoryError> {
        let pending = aggregate.uncommitted_changes();
        if pending.is_empty() {
            return Ok(vec![]);
        }

        let expected_version = aggregate
            .version()
            .checked_sub(pending.len() as u64)
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "{} '{}' has {} uncommitted events but version {}",
                    self.aggregate_type,
                    aggregate.id(),
                    pending.len(),
                    aggregate.version()
                ))
            })?;

        let events = pending
            .iter()
            .map(UncommittedEvent::from_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(tenant_id, aggregate.id(), expected_version, events)
            .await?;

        aggregate.mark_changes_as_committed();
        Ok(committed)
    }
}

/// Reject records a faulty backend should never have returned.
fn validate_loaded_stream(
    tenant_id: &TenantId,
    stream_id: &AggregateId,
    records: &[EventRecord],
) -> Result<(), RepositoryError> {
    for (idx, record) in records.iter().enumerate() {
        if &record.tenant_id != tenant_id {
            return Err(RepositoryError::Store(EventStoreError::TenantIsolation(format!(
                "stream '{stream_id}' of tenant '{tenant_id}' returned an event of tenant '{}' at index {idx}",
                record.tenant_id
            ))));
        }
        if &record.stream_id != stream_id {
            return Err(RepositoryError::CorruptStream(format!(
                "stream '{stream_id}' returned an event of stream '{}' at index {idx}",
                record.stream_id
            )));
        }
        let expected = idx as u64 + 1;
        if record.sequence_number != expected {
            return Err(RepositoryError::CorruptStream(format!(
                "stream '{stream_id}' has sequence number {} at index {idx}, expected {expected}",
                record.sequence_number
            )));
        }
    }
    Ok(())
}
