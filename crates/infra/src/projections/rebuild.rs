//! Rebuilding read models from the event store.
//!
//! Read models are disposable. A rebuild clears one tenant's projection state
//! and replays every event of that tenant, in commit order, through the
//! projector. Re-applying events relies on projector idempotency.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use strata_core::TenantId;
use strata_events::{EventEnvelope, ResettableProjector, TenantScoped};

use crate::event_store::{EventRecord, EventStore, EventStoreError};

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projector '{projector}' failed on event #{sequence_number} of '{stream_id}': {message}")]
    Projection {
        projector: String,
        stream_id: String,
        sequence_number: u64,
        message: String,
    },
}

/// Summary of a rebuild (or dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub tenant_id: TenantId,
    pub projector: String,
    pub events_replayed: u64,
    pub streams_touched: u64,
    pub dry_run: bool,
}

/// Replays a tenant's history into a resettable projector.
pub struct ProjectionRebuilder<S> {
    store: S,
}

impl<S> ProjectionRebuilder<S>
where
    S: EventStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Clear `projector`'s state for `tenant_id` and replay the tenant's events.
    ///
    /// Stops at the first projector error; the read model is then partially
    /// rebuilt and the rebuild can simply be run again.
    pub async fn rebuild(
        &self,
        tenant_id: &TenantId,
        projector: &dyn ResettableProjector,
    ) -> Result<RebuildReport, RebuildError> {
        let records = self.store.load_tenant_events(tenant_id).await?;
        tracing::info!(
            %tenant_id,
            projector = projector.name(),
            events = records.len(),
            "rebuilding projection"
        );

        let envelopes: Vec<EventEnvelope> = records.iter().map(EventRecord::to_envelope).collect();
        // Checked before clearing so a misbehaving store cannot wipe the read model.
        ensure_single_tenant(tenant_id, &envelopes)?;

        projector.clear_tenant(tenant_id);

        let mut streams = HashSet::new();
        for (record, envelope) in records.iter().zip(&envelopes) {
            projector
                .handle(envelope)
                .await
                .map_err(|e| RebuildError::Projection {
                    projector: projector.name().to_string(),
                    stream_id: record.stream_id.to_string(),
                    sequence_number: record.sequence_number,
                    message: format!("{e:#}"),
                })?;
            streams.insert(&record.stream_id);
        }

        Ok(RebuildReport {
            tenant_id: tenant_id.clone(),
            projector: projector.name().to_string(),
            events_replayed: records.len() as u64,
            streams_touched: streams.len() as u64,
            dry_run: false,
        })
    }

    /// Report what a rebuild would replay without touching the projector.
    pub async fn dry_run(
        &self,
        tenant_id: &TenantId,
        projector: &dyn ResettableProjector,
    ) -> Result<RebuildReport, RebuildError> {
        let records = self.store.load_tenant_events(tenant_id).await?;
        let streams: HashSet<_> = records.iter().map(|r| &r.stream_id).collect();

        Ok(RebuildReport {
            tenant_id: tenant_id.clone(),
            projector: projector.name().to_string(),
            events_replayed: records.len() as u64,
            streams_touched: streams.len() as u64,
            dry_run: true,
        })
    }
}

fn ensure_single_tenant<M: TenantScoped>(
    tenant_id: &TenantId,
    messages: &[M],
) -> Result<(), EventStoreError> {
    match messages.iter().find(|m| m.tenant_id() != tenant_id) {
        Some(foreign) => Err(EventStoreError::TenantIsolation(format!(
            "rebuild of tenant '{tenant_id}' received an event of tenant '{}'",
            foreign.tenant_id()
        ))),
        None => Ok(()),
    }
}
