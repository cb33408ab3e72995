//! Process wiring.
//!
//! ```text
//! event store (postgres | in-memory)
//!   ↓
//! PublishingEventStore ──publish──→ InMemoryEventBus ──→ invitations projection
//!   ↓                                                    (queued worker or inline)
//! invitation repository
//!   ↓
//! CommandBus (Create/Accept/RevokeInvitation)
//! ```

use std::sync::Arc;

use strata_core::{AggregateId, TenantId};
use strata_events::{InMemoryEventBus, Projector};
use strata_invitations::INVITATION_EVENT_TYPES;

use crate::command_bus::CommandBus;
use crate::config::StrataConfig;
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, PublishingEventStore,
};
use crate::handlers::{invitation_repository, register_invitation_handlers};
use crate::projections::{
    InvitationReadModel, InvitationsProjection, ProjectionRebuilder, RebuildError, RebuildReport,
};
use crate::read_model::InMemoryTenantStore;
use crate::workers::{ProjectionWorker, WorkerHandle, WorkerStats};

pub type InvitationsReadModel =
    InvitationsProjection<InMemoryTenantStore<AggregateId, InvitationReadModel>>;

/// Wired command side and read side of one process.
pub struct Runtime {
    commands: CommandBus,
    invitations: Arc<InvitationsReadModel>,
    store: Arc<dyn EventStore>,
    worker: Option<WorkerHandle>,
}

/// Connect the configured store and assemble a [`Runtime`] on top of it.
pub async fn bootstrap(config: &StrataConfig) -> Result<Runtime, EventStoreError> {
    let store: Arc<dyn EventStore> = match &config.database_url {
        Some(url) => {
            let postgres = PostgresEventStore::connect(url, config.db_max_connections).await?;
            postgres.ensure_schema().await?;
            Arc::new(postgres)
        }
        None => Arc::new(InMemoryEventStore::new()),
    };

    tracing::info!(
        backend = if config.uses_postgres() { "postgres" } else { "in-memory" },
        projection_queue_capacity = config.projection_queue_capacity,
        "runtime ready"
    );
    Ok(Runtime::assemble(store, config.projection_queue_capacity))
}

impl Runtime {
    /// Wire everything on top of `store`.
    ///
    /// With `queue_capacity > 0` the projection runs on a worker task, so this
    /// must be called from within a Tokio runtime.
    pub fn assemble(store: Arc<dyn EventStore>, queue_capacity: usize) -> Self {
        let invitations: Arc<InvitationsReadModel> =
            Arc::new(InvitationsProjection::new(InMemoryTenantStore::new()));

        let (subscriber, worker) = if queue_capacity == 0 {
            let direct: Arc<dyn Projector> = invitations.clone();
            (direct, None)
        } else {
            let (queued, handle) = ProjectionWorker::spawn(
                InvitationsReadModel::NAME,
                invitations.clone(),
                queue_capacity,
            );
            let queued: Arc<dyn Projector> = queued;
            (queued, Some(handle))
        };

        let mut bus = InMemoryEventBus::new();
        bus.subscribe_all(INVITATION_EVENT_TYPES, subscriber);

        let repository = Arc::new(invitation_repository(PublishingEventStore::new(
            Arc::clone(&store),
            bus,
        )));
        let mut commands = CommandBus::new();
        register_invitation_handlers(&mut commands, repository);

        Self {
            commands,
            invitations,
            store,
            worker,
        }
    }

    pub fn commands(&self) -> &CommandBus {
        &self.commands
    }

    pub fn invitations(&self) -> &Arc<InvitationsReadModel> {
        &self.invitations
    }

    /// The underlying store (reads and writes here bypass publishing).
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Whether projections are applied on a background worker.
    pub fn is_queued(&self) -> bool {
        self.worker.is_some()
    }

    /// Rebuild the invitations read model of `tenant_id` from the store.
    ///
    /// Run it while no commands are in flight for the tenant; events delivered
    /// concurrently may be applied before the reset.
    pub async fn rebuild_invitations(
        &self,
        tenant_id: &TenantId,
    ) -> Result<RebuildReport, RebuildError> {
        ProjectionRebuilder::new(Arc::clone(&self.store))
            .rebuild(tenant_id, self.invitations.as_ref())
            .await
    }

    /// Stop the projection worker after it has drained its queue.
    pub async fn shutdown(self) -> Option<WorkerStats> {
        match self.worker {
            Some(worker) => Some(worker.shutdown().await),
            None => None,
        }
    }
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("commands", &self.commands)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}
