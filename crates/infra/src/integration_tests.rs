//! Integration tests for the full event-sourced pipeline.
//!
//! Command → CommandBus → repository → EventStore → EventBus → projection → read model

use std::sync::Arc;

use chrono::Utc;
use serde_json::Map;
use uuid::Uuid;

use strata_core::{AggregateId, AggregateRoot, TenantId};
use strata_events::{Command, Projector, RequestContext};
use strata_invitations::{
    AcceptInvitation, CreateInvitation, InvitationRole, InvitationStatus, RevokeInvitation,
    invitation_id_for,
};

use crate::command_bus::{DispatchError, InvalidCommand};
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::handlers::invitation_repository;
use crate::runtime::Runtime;

fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

fn ctx(tenant_id: &TenantId) -> RequestContext {
    RequestContext::for_tenant(tenant_id.clone())
}

fn setup() -> (Runtime, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let shared: Arc<dyn EventStore> = store.clone();
    (Runtime::assemble(shared, 0), store)
}

#[tokio::test]
async fn invitation_lifecycle_end_to_end() {
    let (runtime, store) = setup();
    let acme = tenant("acme");
    let id = invitation_id_for("a@acme.com").unwrap();

    let created = runtime
        .commands()
        .dispatch(&ctx(&acme), &CreateInvitation::new("a@acme.com", "architect"))
        .await
        .unwrap();
    assert_eq!(created.version, 1);

    let stream = store.load_events(&acme, &id).await.unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].sequence_number, 1);
    assert_eq!(stream[0].event_type, "InvitationCreated");

    let row = runtime.invitations().get(&acme, &id).unwrap();
    assert_eq!(row.status, InvitationStatus::Pending);
    assert_eq!(row.role, InvitationRole::Architect);

    runtime
        .commands()
        .dispatch(&ctx(&acme), &AcceptInvitation::new("a@acme.com"))
        .await
        .unwrap();

    let stream = store.load_events(&acme, &id).await.unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[1].sequence_number, 2);
    assert_eq!(stream[1].event_type, "InvitationAccepted");
    assert_eq!(
        runtime.invitations().get(&acme, &id).unwrap().status,
        InvitationStatus::Accepted
    );

    let reloaded = invitation_repository(Arc::clone(&store))
        .get_by_id(&acme, &id)
        .await
        .unwrap();
    assert!(reloaded.status().is_accepted());
    assert_eq!(reloaded.version(), 2);
}

#[tokio::test]
async fn tenants_share_ids_without_sharing_state() {
    let (runtime, store) = setup();
    let acme = tenant("acme");
    let globex = tenant("globex");

    for t in [&acme, &globex] {
        runtime
            .commands()
            .dispatch(&ctx(t), &CreateInvitation::new("ada@example.com", "viewer"))
            .await
            .unwrap();
    }
    runtime
        .commands()
        .dispatch(&ctx(&acme), &RevokeInvitation::new("ada@example.com"))
        .await
        .unwrap();

    let id = invitation_id_for("ada@example.com").unwrap();
    assert_eq!(store.load_events(&acme, &id).await.unwrap().len(), 2);
    assert_eq!(store.load_events(&globex, &id).await.unwrap().len(), 1);
    assert!(
        store
            .load_tenant_events(&globex)
            .await
            .unwrap()
            .iter()
            .all(|r| r.tenant_id == globex)
    );

    assert_eq!(
        runtime.invitations().get(&acme, &id).unwrap().status,
        InvitationStatus::Revoked
    );
    assert_eq!(
        runtime.invitations().get(&globex, &id).unwrap().status,
        InvitationStatus::Pending
    );
}

#[tokio::test]
async fn concurrent_writers_one_wins() {
    let (runtime, store) = setup();
    let acme = tenant("acme");
    runtime
        .commands()
        .dispatch(&ctx(&acme), &CreateInvitation::new("ada@acme.com", "admin"))
        .await
        .unwrap();

    let repo = invitation_repository(Arc::clone(&store));
    let id = invitation_id_for("ada@acme.com").unwrap();
    let mut first = repo.get_by_id(&acme, &id).await.unwrap();
    let mut second = repo.get_by_id(&acme, &id).await.unwrap();

    first.accept(Utc::now()).unwrap();
    second.revoke(Utc::now()).unwrap();

    repo.save(&acme, &mut first).await.unwrap();
    let err = repo.save(&acme, &mut second).await.unwrap_err();
    assert!(err.is_concurrency_conflict());

    // The loser's event never reached the stream.
    let stream = store.load_events(&acme, &id).await.unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[1].event_type, "InvitationAccepted");

    // Reloading and retrying now hits the domain rule instead.
    let mut retry = repo.get_by_id(&acme, &id).await.unwrap();
    assert!(retry.revoke(Utc::now()).is_err());
}

#[tokio::test]
async fn routing_failures_have_no_side_effects() {
    #[derive(Debug)]
    struct ResendInvitation;

    impl Command for ResendInvitation {
        fn command_name(&self) -> &'static str {
            "ResendInvitation"
        }
    }

    let (runtime, store) = setup();

    let err = runtime
        .commands()
        .dispatch(&ctx(&tenant("acme")), &ResendInvitation)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidCommand(InvalidCommand::Unregistered(_))
    ));

    let err = runtime
        .commands()
        .dispatch(
            &RequestContext::new(),
            &CreateInvitation::new("ada@acme.com", "admin"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::TenantContextMissing(_)));

    assert!(store.is_empty());
}

#[tokio::test]
async fn unknown_event_type_in_stream_fails_the_load() {
    let (runtime, store) = setup();
    let acme = tenant("acme");
    let created = runtime
        .commands()
        .dispatch(&ctx(&acme), &CreateInvitation::new("ada@acme.com", "admin"))
        .await
        .unwrap();

    // Written by a newer deployment that knows an extra event kind.
    store
        .append(
            &acme,
            &created.aggregate_id,
            1,
            vec![UncommittedEvent {
                event_id: Uuid::now_v7(),
                aggregate_id: created.aggregate_id.clone(),
                event_type: "InvitationResent".to_string(),
                occurred_at: Utc::now(),
                payload: Map::new(),
            }],
        )
        .await
        .unwrap();

    let err = runtime
        .commands()
        .dispatch(&ctx(&acme), &AcceptInvitation::new("ada@acme.com"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnknownEventType { ref event_type, .. } if event_type == "InvitationResent"
    ));
}

#[tokio::test]
async fn redelivered_events_do_not_change_the_read_model() {
    let (runtime, store) = setup();
    let acme = tenant("acme");
    let ctx = ctx(&acme);
    runtime
        .commands()
        .dispatch(&ctx, &CreateInvitation::new("ada@acme.com", "admin"))
        .await
        .unwrap();
    runtime
        .commands()
        .dispatch(&ctx, &AcceptInvitation::new("ada@acme.com"))
        .await
        .unwrap();
    let settled = runtime.invitations().list(&acme);

    // Replay the whole history again, oldest first, as an at-least-once bus might.
    for record in store.load_tenant_events(&acme).await.unwrap() {
        runtime.invitations().handle(&record.to_envelope()).await.unwrap();
    }
    assert_eq!(runtime.invitations().list(&acme), settled);
}

#[tokio::test]
async fn rebuild_recovers_events_the_projection_missed() {
    let store = Arc::new(InMemoryEventStore::new());
    let acme = tenant("acme");

    // Written by another process: this runtime's projection never saw them.
    let repo = invitation_repository(Arc::clone(&store));
    for email in ["ada@acme.com", "bob@acme.com"] {
        let mut invitation =
            strata_invitations::Invitation::create(email, InvitationRole::Viewer, Utc::now())
                .unwrap();
        repo.save(&acme, &mut invitation).await.unwrap();
    }

    let shared: Arc<dyn EventStore> = store.clone();
    let runtime = Runtime::assemble(shared, 0);
    assert!(runtime.invitations().list(&acme).is_empty());

    let report = runtime.rebuild_invitations(&acme).await.unwrap();
    assert_eq!(report.events_replayed, 2);
    assert_eq!(runtime.invitations().list_pending(&acme).len(), 2);
}

#[tokio::test]
async fn queued_projection_matches_inline_projection() {
    let store = Arc::new(InMemoryEventStore::new());
    let shared: Arc<dyn EventStore> = store.clone();
    let runtime = Runtime::assemble(shared, 2);
    let acme = tenant("acme");
    let ctx = ctx(&acme);

    for email in ["a@acme.com", "b@acme.com", "c@acme.com"] {
        runtime
            .commands()
            .dispatch(&ctx, &CreateInvitation::new(email, "viewer"))
            .await
            .unwrap();
    }
    runtime
        .commands()
        .dispatch(&ctx, &AcceptInvitation::new("b@acme.com"))
        .await
        .unwrap();

    let inline = Runtime::assemble(store.clone(), 0);
    inline.rebuild_invitations(&acme).await.unwrap();

    let queued = Arc::clone(runtime.invitations());
    let stats = runtime.shutdown().await.unwrap();
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(queued.list(&acme), inline.invitations().list(&acme));
}

#[test]
fn stream_ids_come_from_the_normalised_email() {
    let id: AggregateId = invitation_id_for("  Ada@Acme.COM ").unwrap();
    assert_eq!(id.as_str(), "invitation:ada@acme.com");
}
