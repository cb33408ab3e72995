//! Command routing (application-level orchestration).
//!
//! ```text
//! dispatch(ctx, command)
//!   ↓
//! 1. ctx.tenant()             (fails closed when no tenant is in scope)
//!   ↓
//! 2. lookup command_name()    (exactly one handler per name)
//!   ↓
//! 3. downcast to the handler's command type
//!   ↓
//! 4. handler: load → decide → save (through a repository)
//! ```
//!
//! The bus adds no transactions, retries or timeouts. A concurrency conflict
//! surfaces as [`DispatchError::Concurrency`], which callers may retry.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use thiserror::Error;
use tracing::Instrument;

use strata_core::{AggregateId, DomainError, TenantId};
use strata_events::{Command, RequestContext, TenantContextMissing};

use crate::event_store::EventStoreError;
use crate::repository::RepositoryError;

/// Stream state after a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub aggregate_id: AggregateId,
    /// Stream version after the write.
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCommand {
    #[error("no handler registered for command '{0}'")]
    Unregistered(String),

    #[error("handler registered for '{command_name}' expects {expected}")]
    TypeMismatch {
        command_name: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidCommand(#[from] InvalidCommand),

    #[error(transparent)]
    TenantContextMissing(#[from] TenantContextMissing),

    #[error("{aggregate_type} '{id}' not found")]
    NotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// Lost an optimistic-concurrency race. Reload and retry.
    #[error("{0}")]
    Concurrency(EventStoreError),

    #[error("stream '{stream_id}' contains unknown event type '{event_type}'")]
    UnknownEventType {
        stream_id: AggregateId,
        event_type: String,
    },

    #[error("command rejected: {0}")]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(EventStoreError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl DispatchError {
    /// Only concurrency conflicts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(err: EventStoreError) -> Self {
        if err.is_concurrency_conflict() {
            DispatchError::Concurrency(err)
        } else {
            DispatchError::Store(err)
        }
    }
}

impl From<RepositoryError> for DispatchError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { aggregate_type, id } => {
                DispatchError::NotFound { aggregate_type, id }
            }
            RepositoryError::UnknownEventType {
                stream_id,
                event_type,
            } => DispatchError::UnknownEventType {
                stream_id,
                event_type,
            },
            RepositoryError::Store(e) => e.into(),
            RepositoryError::Domain(e) => DispatchError::Domain(e),
            other => DispatchError::Repository(other),
        }
    }
}

/// Handles one concrete command type for the tenant in scope.
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(
        &self,
        tenant_id: &TenantId,
        command: &C,
    ) -> Result<CommandOutcome, DispatchError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_erased(
        &self,
        command_name: &str,
        tenant_id: &TenantId,
        command: &dyn Command,
    ) -> Result<CommandOutcome, DispatchError>;
}

struct Typed<C, H> {
    handler: H,
    _command: PhantomData<fn(&C)>,
}

#[async_trait]
impl<C, H> ErasedHandler for Typed<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    async fn handle_erased(
        &self,
        command_name: &str,
        tenant_id: &TenantId,
        command: &dyn Command,
    ) -> Result<CommandOutcome, DispatchError> {
        let Some(command) = command.as_any().downcast_ref::<C>() else {
            return Err(InvalidCommand::TypeMismatch {
                command_name: command_name.to_string(),
                expected: core::any::type_name::<C>(),
            }
            .into());
        };
        self.handler.handle(tenant_id, command).await
    }
}

/// Routes each command to the single handler registered under its name.
///
/// Handlers are registered at start-up (`&mut self`); the bus is then shared
/// immutably.
#[derive(Default)]
pub struct CommandBus {
    handlers: HashMap<String, Box<dyn ErasedHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for commands named `name`, replacing any previous one.
    pub fn register<C, H>(&mut self, name: impl Into<String>, handler: H)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let name = name.into();
        let typed = Typed {
            handler,
            _command: PhantomData::<fn(&C)>,
        };
        if self.handlers.insert(name.clone(), Box::new(typed)).is_some() {
            tracing::debug!(command = %name, "replaced command handler");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        command: &dyn Command,
    ) -> Result<CommandOutcome, DispatchError> {
        let command_name = command.command_name();
        let tenant_id = ctx.tenant()?;

        let handler = self
            .handlers
            .get(command_name)
            .ok_or_else(|| InvalidCommand::Unregistered(command_name.to_string()))?;

        let span = tracing::info_span!(
            "dispatch",
            command = command_name,
            tenant_id = %tenant_id,
            correlation_id = %ctx.correlation_id()
        );

        let result = handler
            .handle_erased(command_name, tenant_id, command)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(outcome) => tracing::debug!(
                aggregate_id = %outcome.aggregate_id,
                version = outcome.version,
                "command handled"
            ),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "command lost a concurrency race")
            }
            Err(e) => tracing::debug!(error = %e, "command failed"),
        });
        result
    }
}

impl core::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CommandBus").field("handlers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug)]
    struct Ping {
        target: &'static str,
    }

    impl Command for Ping {
        fn command_name(&self) -> &'static str {
            "Ping"
        }
    }

    /// Claims to be a `Ping` but is a different type.
    #[derive(Debug)]
    struct Impostor;

    impl Command for Impostor {
        fn command_name(&self) -> &'static str {
            "Ping"
        }
    }

    #[derive(Debug)]
    struct Unknown;

    impl Command for Unknown {
        fn command_name(&self) -> &'static str {
            "Unknown"
        }
    }

    #[derive(Default)]
    struct PingHandler {
        calls: Arc<AtomicUsize>,
        version: u64,
    }

    #[async_trait]
    impl CommandHandler<Ping> for PingHandler {
        async fn handle(
            &self,
            _tenant_id: &TenantId,
            command: &Ping,
        ) -> Result<CommandOutcome, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutcome {
                aggregate_id: AggregateId::parse(command.target)?,
                version: self.version,
            })
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::for_tenant(TenantId::parse("acme").unwrap())
    }

    #[tokio::test]
    async fn routes_to_the_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = CommandBus::new();
        bus.register::<Ping, _>(
            "Ping",
            PingHandler {
                calls: Arc::clone(&calls),
                version: 1,
            },
        );

        assert!(bus.is_registered("Ping"));
        assert!(!bus.is_registered("Unknown"));

        let outcome = bus.dispatch(&ctx(), &Ping { target: "p-1" }).await.unwrap();
        assert_eq!(outcome.aggregate_id.as_str(), "p-1");
        assert_eq!(outcome.version, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_command_is_invalid() {
        let bus = CommandBus::new();
        let err = bus.dispatch(&ctx(), &Unknown).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidCommand(InvalidCommand::Unregistered(ref name))
                if name == "Unknown"
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn type_mismatch_never_reaches_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = CommandBus::new();
        bus.register::<Ping, _>(
            "Ping",
            PingHandler {
                calls: Arc::clone(&calls),
                version: 1,
            },
        );

        let err = bus.dispatch(&ctx(), &Impostor).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidCommand(InvalidCommand::TypeMismatch { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_tenant_fails_closed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = CommandBus::new();
        bus.register::<Ping, _>(
            "Ping",
            PingHandler {
                calls: Arc::clone(&calls),
                version: 1,
            },
        );

        let err = bus
            .dispatch(&RequestContext::new(), &Ping { target: "p-1" })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TenantContextMissing(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn re_registration_replaces_the_handler() {
        let mut bus = CommandBus::new();
        bus.register::<Ping, _>("Ping", PingHandler::default());
        bus.register::<Ping, _>(
            "Ping",
            PingHandler {
                calls: Arc::default(),
                version: 7,
            },
        );

        let outcome = bus.dispatch(&ctx(), &Ping { target: "p-1" }).await.unwrap();
        assert_eq!(outcome.version, 7);
    }

    #[test]
    fn only_concurrency_conflicts_are_retryable() {
        let conflict: DispatchError = EventStoreError::Concurrency {
            tenant_id: TenantId::parse("acme").unwrap(),
            stream_id: AggregateId::parse("s").unwrap(),
            expected: 0,
            actual: 1,
        }
        .into();
        assert!(conflict.is_retryable());

        let backend: DispatchError = EventStoreError::Backend("down".to_string()).into();
        assert!(!backend.is_retryable());

        let domain: DispatchError = DomainError::invariant("already accepted").into();
        assert!(!domain.is_retryable());

        let nested: DispatchError = RepositoryError::Store(EventStoreError::Concurrency {
            tenant_id: TenantId::parse("acme").unwrap(),
            stream_id: AggregateId::parse("s").unwrap(),
            expected: 1,
            actual: 2,
        })
        .into();
        assert!(nested.is_retryable());
    }
}
