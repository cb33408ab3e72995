//! Invitations projection.
//!
//! Tenant-isolated list of invitations and their status, keyed by stream id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::{AggregateId, TenantId};
use strata_events::{EventEnvelope, Projector, ResettableProjector};
use strata_invitations::{
    InvitationAccepted, InvitationCreated, InvitationRevoked, InvitationRole, InvitationStatus,
    invitation_id_for,
};

use crate::read_model::TenantStore;

// ─────────────────────────────────────────────────────────────────────────────
// Read Model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationReadModel {
    pub invitation_id: AggregateId,
    pub email: String,
    pub role: InvitationRole,
    pub status: InvitationStatus,
    /// Highest stream sequence number applied; older deliveries are ignored.
    pub last_sequence: u64,
    pub invited_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Projection
// ─────────────────────────────────────────────────────────────────────────────

pub struct InvitationsProjection<S> {
    store: S,
}

impl<S> InvitationsProjection<S>
where
    S: TenantStore<AggregateId, InvitationReadModel>,
{
    pub const NAME: &'static str = "invitations";

    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let tenant_id = envelope.tenant_id();

        if let Some(e) = envelope.payload_as::<InvitationCreated>()? {
            self.apply_created(tenant_id, envelope.sequence_number(), e);
        } else if let Some(e) = envelope.payload_as::<InvitationAccepted>()? {
            self.apply_status(
                tenant_id,
                &e.invitation_id,
                envelope.sequence_number(),
                InvitationStatus::Accepted,
                e.occurred_at,
            );
        } else if let Some(e) = envelope.payload_as::<InvitationRevoked>()? {
            self.apply_status(
                tenant_id,
                &e.invitation_id,
                envelope.sequence_number(),
                InvitationStatus::Revoked,
                e.occurred_at,
            );
        }
        Ok(())
    }

    fn apply_created(&self, tenant_id: &TenantId, sequence: u64, e: InvitationCreated) {
        let key = e.invitation_id.clone();
        self.store.modify(tenant_id, key, &mut |current| {
            if current.is_some_and(|m| m.last_sequence >= sequence) {
                return None;
            }
            Some(InvitationReadModel {
                invitation_id: e.invitation_id.clone(),
                email: e.email.clone(),
                role: e.role,
                status: InvitationStatus::Pending,
                last_sequence: sequence,
                invited_at: e.occurred_at,
                updated_at: e.occurred_at,
            })
        });
    }

    fn apply_status(
        &self,
        tenant_id: &TenantId,
        invitation_id: &AggregateId,
        sequence: u64,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) {
        let applied = self
            .store
            .modify(tenant_id, invitation_id.clone(), &mut |current| {
                let current = current?;
                if current.last_sequence >= sequence {
                    return None;
                }
                Some(InvitationReadModel {
                    status,
                    last_sequence: sequence,
                    updated_at: at,
                    ..current.clone()
                })
            });

        if !applied {
            tracing::debug!(
                %tenant_id,
                %invitation_id,
                sequence,
                "skipped stale or out-of-order invitation event"
            );
        }
    }

    pub fn get(
        &self,
        tenant_id: &TenantId,
        invitation_id: &AggregateId,
    ) -> Option<InvitationReadModel> {
        self.store.get(tenant_id, invitation_id)
    }

    pub fn get_by_email(&self, tenant_id: &TenantId, email: &str) -> Option<InvitationReadModel> {
        let invitation_id = invitation_id_for(email).ok()?;
        self.get(tenant_id, &invitation_id)
    }

    /// All invitations of a tenant, sorted by email.
    pub fn list(&self, tenant_id: &TenantId) -> Vec<InvitationReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.email.cmp(&b.email));
        all
    }

    pub fn list_pending(&self, tenant_id: &TenantId) -> Vec<InvitationReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|m| m.status.is_pending())
            .collect()
    }
}

#[async_trait]
impl<S> Projector for InvitationsProjection<S>
where
    S: TenantStore<AggregateId, InvitationReadModel>,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.apply_envelope(envelope)
    }
}

impl<S> ResettableProjector for InvitationsProjection<S>
where
    S: TenantStore<AggregateId, InvitationReadModel>,
{
    fn clear_tenant(&self, tenant_id: &TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{Value as JsonValue, json};
    use strata_events::EventPayload;
    use uuid::Uuid;

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    type Projection = InvitationsProjection<InMemoryTenantStore<AggregateId, InvitationReadModel>>;

    fn projection() -> Projection {
        InvitationsProjection::new(InMemoryTenantStore::new())
    }

    fn acme() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn envelope<P: EventPayload>(
        tenant_id: &TenantId,
        sequence: u64,
        payload: &P,
    ) -> EventEnvelope {
        let data = payload.to_event_data().unwrap();
        let stream = data["invitation_id"].as_str().unwrap().to_string();
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id.clone(),
            AggregateId::parse(stream).unwrap(),
            sequence,
            P::EVENT_TYPE,
            Utc::now(),
            JsonValue::Object(data),
        )
    }

    fn created(email: &str) -> InvitationCreated {
        InvitationCreated {
            invitation_id: invitation_id_for(email).unwrap(),
            email: email.to_string(),
            role: InvitationRole::Architect,
            occurred_at: Utc::now(),
        }
    }

    fn accepted(email: &str) -> InvitationAccepted {
        InvitationAccepted {
            invitation_id: invitation_id_for(email).unwrap(),
            email: email.to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn created_then_accepted() {
        let p = projection();
        p.apply_envelope(&envelope(&acme(), 1, &created("ada@acme.com"))).unwrap();
        assert_eq!(
            p.get_by_email(&acme(), "ada@acme.com").unwrap().status,
            InvitationStatus::Pending
        );

        p.apply_envelope(&envelope(&acme(), 2, &accepted("ada@acme.com"))).unwrap();
        let model = p.get_by_email(&acme(), "ADA@acme.com").unwrap();
        assert_eq!(model.status, InvitationStatus::Accepted);
        assert_eq!(model.role, InvitationRole::Architect);
        assert_eq!(model.last_sequence, 2);
        assert!(p.list_pending(&acme()).is_empty());
    }

    #[test]
    fn redelivery_is_idempotent() {
        let p = projection();
        let create = envelope(&acme(), 1, &created("ada@acme.com"));
        let accept = envelope(&acme(), 2, &accepted("ada@acme.com"));

        p.apply_envelope(&create).unwrap();
        p.apply_envelope(&accept).unwrap();
        let once = p.list(&acme());

        p.apply_envelope(&create).unwrap();
        p.apply_envelope(&accept).unwrap();
        assert_eq!(p.list(&acme()), once);
    }

    #[test]
    fn tenants_are_isolated() {
        let p = projection();
        let globex = TenantId::parse("globex").unwrap();
        p.apply_envelope(&envelope(&acme(), 1, &created("ada@acme.com"))).unwrap();

        assert!(p.get_by_email(&globex, "ada@acme.com").is_none());
        assert!(p.list(&globex).is_empty());
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let p = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            acme(),
            AggregateId::parse("order-1").unwrap(),
            1,
            "OrderPlaced",
            Utc::now(),
            json!({ "total": 10 }),
        );
        p.apply_envelope(&env).unwrap();
        assert!(p.list(&acme()).is_empty());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let p = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            acme(),
            AggregateId::parse("invitation:ada@acme.com").unwrap(),
            1,
            InvitationCreated::EVENT_TYPE,
            Utc::now(),
            json!({ "email": 42 }),
        );
        assert!(p.apply_envelope(&env).is_err());
    }

    #[test]
    fn clear_tenant_drops_only_that_tenant() {
        let p = projection();
        let globex = TenantId::parse("globex").unwrap();
        p.apply_envelope(&envelope(&acme(), 1, &created("ada@acme.com"))).unwrap();
        p.apply_envelope(&envelope(&globex, 1, &created("bob@globex.com"))).unwrap();

        p.clear_tenant(&acme());
        assert!(p.list(&acme()).is_empty());
        assert_eq!(p.list(&globex).len(), 1);
    }
}
