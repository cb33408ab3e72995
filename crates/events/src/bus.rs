//! Event publishing abstraction.
//!
//! Events are **stored first**, then published. The bus only distributes what
//! the store already committed, so a failed delivery never loses data: the
//! store stays the source of truth and projections can be rebuilt from it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::EventEnvelope;

/// Fan-out of committed events to their consumers.
///
/// `publish` is infallible from the caller's point of view: consumer failures
/// are handled (logged) by the bus itself.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope);
}

#[async_trait]
impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    async fn publish(&self, envelope: &EventEnvelope) {
        (**self).publish(envelope).await
    }
}
