//! In-process event bus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::EventBus;
use crate::projection::Projector;
use crate::EventEnvelope;

/// Synchronous in-process pub/sub keyed by event type.
///
/// - Subscriptions are set up at start-up through `&mut self`; afterwards the bus
///   is shared immutably (usually in an `Arc`).
/// - `publish` runs every projector subscribed to the envelope's event type, in
///   subscription order, inside the publishing call.
/// - A projector error is logged and swallowed; the remaining projectors still run.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscriptions: HashMap<String, Vec<Arc<dyn Projector>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `projector` to one event type.
    ///
    /// Subscribing the same projector twice is allowed and yields two deliveries.
    pub fn subscribe(&mut self, event_type: impl Into<String>, projector: Arc<dyn Projector>) {
        self.subscriptions
            .entry(event_type.into())
            .or_default()
            .push(projector);
    }

    /// Subscribe `projector` to each of `event_types`.
    pub fn subscribe_all<I, T>(&mut self, event_types: I, projector: Arc<dyn Projector>)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for event_type in event_types {
            self.subscribe(event_type, Arc::clone(&projector));
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscriptions.get(event_type).map_or(0, Vec::len)
    }
}

impl core::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscriptions
            .iter()
            .map(|(event_type, subs)| (event_type.as_str(), subs.len()))
            .collect();
        f.debug_struct("InMemoryEventBus")
            .field("subscriptions", &counts)
            .finish()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: &EventEnvelope) {
        let Some(projectors) = self.subscriptions.get(envelope.event_type()) else {
            return;
        };

        for projector in projectors {
            if let Err(error) = projector.handle(envelope).await {
                tracing::warn!(
                    projector = projector.name(),
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence_number = envelope.sequence_number(),
                    event_type = envelope.event_type(),
                    error = %error,
                    "projector failed; event stays in the store"
                );
            }
        }
    }
}
