use async_trait::async_trait;

use strata_core::TenantId;

use crate::EventEnvelope;

/// Consumer of committed events that maintains a read model.
///
/// Projectors must be **idempotent**: the same envelope may be delivered more
/// than once (rebuilds, redelivery), so updates are upserts keyed by tenant and
/// stream, guarded by the stream's sequence number. Event types the projector
/// does not care about are a no-op.
///
/// Errors are reported to the caller (bus or worker), which logs them; they
/// never fail the write that produced the event.
#[async_trait]
pub trait Projector: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// A projector whose state for one tenant can be dropped and replayed.
pub trait ResettableProjector: Projector {
    fn clear_tenant(&self, tenant_id: &TenantId);
}
