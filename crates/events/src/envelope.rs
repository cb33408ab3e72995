use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use strata_core::{AggregateId, TenantId};

use crate::event::{EventDataError, EventPayload};

/// A committed event as seen by consumers (bus, projectors, rebuilds).
///
/// Notes:
/// - **Multi-tenancy** is carried here via `tenant_id`; stream ids are only unique per tenant.
/// - `sequence_number` is the 1-based, gapless position within the aggregate stream.
/// - `payload` is the stored event data, decoded lazily with [`EventEnvelope::payload_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P = JsonValue> {
    event_id: Uuid,
    tenant_id: TenantId,
    aggregate_id: AggregateId,

    /// Position in the aggregate stream (first event is 1).
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: P,
}

impl<P> EventEnvelope<P> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: P,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            aggregate_id,
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Decode the payload as `T`, if this envelope carries `T`'s tag.
    ///
    /// Returns `Ok(None)` for other event types so projectors can skip them.
    pub fn payload_as<T: EventPayload>(&self) -> Result<Option<T>, EventDataError> {
        if self.event_type != T::EVENT_TYPE {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.payload.clone())?))
    }
}
