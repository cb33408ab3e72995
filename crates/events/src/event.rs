use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use strata_core::AggregateId;

/// Serialized data of a single event: a string-keyed JSON object.
///
/// This is both the persisted `payload` of an event record and what projectors
/// read back from an envelope.
pub type EventData = Map<String, JsonValue>;

/// A domain event (an immutable fact about one aggregate).
///
/// Implemented by each aggregate's closed event enum. `event_type` and
/// `event_data` are exhaustive matches over the variants, so adding an event
/// kind without an encoding is a compile error.
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable tag identifying the event kind in storage (e.g. "InvitationCreated").
    fn event_type(&self) -> &'static str;

    /// Aggregate (stream) this event belongs to.
    fn aggregate_id(&self) -> &AggregateId;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Encode the event's data for persistence.
    fn event_data(&self) -> Result<EventData, EventDataError>;
}

/// A single concrete event kind, serialized as a flat JSON object.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tag stored next to the data; must be unique across an aggregate's events.
    const EVENT_TYPE: &'static str;

    fn to_event_data(&self) -> Result<EventData, EventDataError> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(EventDataError::NotAnObject {
                event_type: Self::EVENT_TYPE,
                found: json_kind(&other),
            }),
        }
    }

    fn from_event_data(data: EventData) -> Result<Self, EventDataError> {
        Ok(serde_json::from_value(JsonValue::Object(data))?)
    }
}

#[derive(Debug, Error)]
pub enum EventDataError {
    #[error("event data for '{event_type}' must be a JSON object, found {found}")]
    NotAnObject {
        event_type: &'static str,
        found: &'static str,
    },

    #[error("event data (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
