//! Decoder registry: event tag → typed event.
//!
//! Built once at process start for each aggregate and shared read-only
//! (usually behind an `Arc`) by every repository of that aggregate type.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::event::{DomainEvent, EventData, EventDataError, EventPayload, json_kind};

type Decoder<E> = Box<dyn Fn(EventData) -> Result<E, EventDataError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// A persisted tag has no decoder. Deployment/versioning bug, not bad data.
    #[error("no decoder registered for event type '{0}'")]
    UnknownEventType(String),

    #[error("failed to decode '{event_type}' event: {source}")]
    Data {
        event_type: String,
        #[source]
        source: EventDataError,
    },
}

/// Maps stored event tags to decoders producing an aggregate's event enum.
///
/// ```ignore
/// let registry = EventRegistry::new()
///     .register(InvitationEvent::Created)
///     .register(InvitationEvent::Accepted);
/// ```
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> EventRegistry<E>
where
    E: DomainEvent,
{
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register the payload type `P` under its tag, wrapped into `E` by `wrap`.
    ///
    /// Registering the same tag twice keeps the last decoder.
    pub fn register<P>(mut self, wrap: fn(P) -> E) -> Self
    where
        P: EventPayload,
    {
        self.decoders.insert(
            P::EVENT_TYPE,
            Box::new(move |data| P::from_event_data(data).map(wrap)),
        );
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode a stored payload tagged `event_type`.
    pub fn decode(&self, event_type: &str, payload: JsonValue) -> Result<E, DecodeError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DecodeError::UnknownEventType(event_type.to_string()))?;

        let data = match payload {
            JsonValue::Object(map) => map,
            other => {
                return Err(DecodeError::Data {
                    event_type: event_type.to_string(),
                    source: EventDataError::NotAnObject {
                        event_type: "stored payload",
                        found: json_kind(&other),
                    },
                });
            }
        };

        decoder(data).map_err(|source| DecodeError::Data {
            event_type: event_type.to_string(),
            source,
        })
    }
}

impl<E> Default for EventRegistry<E>
where
    E: DomainEvent,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("EventRegistry").field("event_types", &tags).finish()
    }
}
