//! Runs the invitation lifecycle against the configured store and prints the read model.

use std::sync::Arc;

use anyhow::Context;

use strata_core::TenantId;
use strata_events::{Command, RequestContext};
use strata_infra::command_bus::{CommandBus, DispatchError};
use strata_infra::config::StrataConfig;
use strata_infra::runtime;
use strata_invitations::{AcceptInvitation, CreateInvitation, RevokeInvitation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    strata_observability::init();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let runtime = runtime::bootstrap(&config)
        .await
        .context("failed to start runtime")?;

    let tenant_id = TenantId::parse("acme")?;
    let ctx = RequestContext::for_tenant(tenant_id.clone());
    let commands = runtime.commands();

    run(commands, &ctx, &CreateInvitation::new("ada@acme.com", "architect")).await?;
    run(commands, &ctx, &CreateInvitation::new("bob@acme.com", "viewer")).await?;
    run(commands, &ctx, &AcceptInvitation::new("ada@acme.com")).await?;
    run(commands, &ctx, &RevokeInvitation::new("bob@acme.com")).await?;
    // Rejected: bob's invitation is no longer pending.
    run(commands, &ctx, &AcceptInvitation::new("bob@acme.com")).await?;

    // Let a queued projection catch up before reading.
    let invitations = Arc::clone(runtime.invitations());
    if let Some(stats) = runtime.shutdown().await {
        tracing::info!(
            processed = stats.processed,
            failed = stats.failed,
            "projection worker drained"
        );
    }

    for row in invitations.list(&tenant_id) {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

/// Dispatch `command`; domain rejections are logged, anything else aborts.
///
/// Against a persistent store a second run hits the rejections instead of
/// creating duplicates.
async fn run(bus: &CommandBus, ctx: &RequestContext, command: &dyn Command) -> anyhow::Result<()> {
    match bus.dispatch(ctx, command).await {
        Ok(outcome) => {
            tracing::info!(
                command = command.command_name(),
                aggregate_id = %outcome.aggregate_id,
                version = outcome.version,
                "command applied"
            );
            Ok(())
        }
        Err(err @ DispatchError::Domain(_)) => {
            tracing::info!(command = command.command_name(), error = %err, "command rejected");
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("{} failed", command.command_name())),
    }
}
