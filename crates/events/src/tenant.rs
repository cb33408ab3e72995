//! Tenant context.
//!
//! The tenant is resolved once at the edge (request context) and passed
//! explicitly as `&TenantId` everywhere below the command bus.

use thiserror::Error;
use uuid::Uuid;

use strata_core::TenantId;

use crate::EventEnvelope;

/// Raised when an operation needs a tenant and none is in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no tenant in request context")]
pub struct TenantContextMissing;

/// Per-request context handed to the command bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    tenant_id: Option<TenantId>,
    correlation_id: Uuid,
}

impl RequestContext {
    /// A context without a tenant and a fresh correlation id.
    pub fn new() -> Self {
        Self {
            tenant_id: None,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self::new().with_tenant(tenant_id)
    }

    /// Returns a copy of this context with `tenant_id` in scope.
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The tenant in scope. Never falls back to a default tenant.
    pub fn tenant(&self) -> Result<&TenantId, TenantContextMissing> {
        self.tenant_id.as_ref().ok_or(TenantContextMissing)
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages that belong to exactly one tenant.
///
/// Lets infrastructure (e.g. projection rebuilds) check a message against the tenant
/// it is supposed to process before touching tenant-scoped state.
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;
}

impl<P> TenantScoped for EventEnvelope<P> {
    fn tenant_id(&self) -> &TenantId {
        EventEnvelope::tenant_id(self)
    }
}
