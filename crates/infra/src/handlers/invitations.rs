use std::sync::Arc;

use async_trait::async_trait;

use strata_core::{AggregateRoot, DomainError, TenantId};
use strata_invitations::{
    AcceptInvitation, CreateInvitation, Invitation, InvitationRole, RevokeInvitation,
    invitation_event_registry, invitation_id_for,
};

use crate::command_bus::{CommandBus, CommandHandler, CommandOutcome, DispatchError};
use crate::event_store::EventStore;
use crate::repository::{EventSourcedRepository, RepositoryError};

pub type InvitationRepository<S> = EventSourcedRepository<Invitation, S>;

/// Repository for invitation streams on `store`.
pub fn invitation_repository<S: EventStore>(store: S) -> InvitationRepository<S> {
    EventSourcedRepository::new(
        store,
        Arc::new(invitation_event_registry()),
        Invitation::reconstitute,
        Invitation::AGGREGATE_TYPE,
    )
}

/// Register the create/accept/revoke handlers under their command names.
pub fn register_invitation_handlers<S>(
    bus: &mut CommandBus,
    repository: Arc<InvitationRepository<S>>,
) where
    S: EventStore + 'static,
{
    bus.register::<CreateInvitation, _>(
        "CreateInvitation",
        CreateInvitationHandler {
            repository: Arc::clone(&repository),
        },
    );
    bus.register::<AcceptInvitation, _>(
        "AcceptInvitation",
        AcceptInvitationHandler {
            repository: Arc::clone(&repository),
        },
    );
    bus.register::<RevokeInvitation, _>("RevokeInvitation", RevokeInvitationHandler { repository });
}

async fn save(
    repository: &InvitationRepository<impl EventStore>,
    tenant_id: &TenantId,
    invitation: &mut Invitation,
) -> Result<CommandOutcome, DispatchError> {
    repository.save(tenant_id, invitation).await?;
    Ok(CommandOutcome {
        aggregate_id: invitation.id().clone(),
        version: invitation.version(),
    })
}

pub struct CreateInvitationHandler<S> {
    repository: Arc<InvitationRepository<S>>,
}

#[async_trait]
impl<S> CommandHandler<CreateInvitation> for CreateInvitationHandler<S>
where
    S: EventStore,
{
    async fn handle(
        &self,
        tenant_id: &TenantId,
        command: &CreateInvitation,
    ) -> Result<CommandOutcome, DispatchError> {
        let role: InvitationRole = command.role.parse()?;
        let invitation_id = invitation_id_for(&command.email)?;

        match self.repository.get_by_id(tenant_id, &invitation_id).await {
            Ok(existing) => {
                return Err(DomainError::conflict(format!(
                    "an invitation for '{}' already exists ({})",
                    existing.email(),
                    existing.status()
                ))
                .into());
            }
            Err(RepositoryError::NotFound { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        let mut invitation = Invitation::create(&command.email, role, command.occurred_at)?;
        save(&*self.repository, tenant_id, &mut invitation).await
    }
}

pub struct AcceptInvitationHandler<S> {
    repository: Arc<InvitationRepository<S>>,
}

#[async_trait]
impl<S> CommandHandler<AcceptInvitation> for AcceptInvitationHandler<S>
where
    S: EventStore,
{
    async fn handle(
        &self,
        tenant_id: &TenantId,
        command: &AcceptInvitation,
    ) -> Result<CommandOutcome, DispatchError> {
        let invitation_id = invitation_id_for(&command.email)?;
        let mut invitation = self.repository.get_by_id(tenant_id, &invitation_id).await?;
        invitation.accept(command.occurred_at)?;
        save(&*self.repository, tenant_id, &mut invitation).await
    }
}

pub struct RevokeInvitationHandler<S> {
    repository: Arc<InvitationRepository<S>>,
}

#[async_trait]
impl<S> CommandHandler<RevokeInvitation> for RevokeInvitationHandler<S>
where
    S: EventStore,
{
    async fn handle(
        &self,
        tenant_id: &TenantId,
        command: &RevokeInvitation,
    ) -> Result<CommandOutcome, DispatchError> {
        let invitation_id = invitation_id_for(&command.email)?;
        let mut invitation = self.repository.get_by_id(tenant_id, &invitation_id).await?;
        invitation.revoke(command.occurred_at)?;
        save(&*self.repository, tenant_id, &mut invitation).await
    }
}
