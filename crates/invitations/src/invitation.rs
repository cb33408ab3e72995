//! Invitation aggregate (event-sourced).
//!
//! One stream per invited email within a tenant. The stream id is derived from
//! the normalised email, so inviting the same address twice targets the same
//! stream; the second create is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::{AggregateBase, AggregateId, DomainError, EventSourced};
use strata_events::{Command, DomainEvent, EventData, EventDataError, EventPayload, EventRegistry};

use crate::InvitationRole;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

const STREAM_PREFIX: &str = "invitation:";

/// Trim and lower-case an email address, rejecting obviously malformed input.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_ascii_lowercase();

    if email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!(
            "email '{email}' must not contain whitespace"
        )));
    }

    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(DomainError::validation(format!(
            "'{email}' is not a valid email address"
        ))),
    }
}

/// Stream id of the invitation for `email`.
pub fn invitation_id_for(email: &str) -> Result<AggregateId, DomainError> {
    let email = normalize_email(email)?;
    AggregateId::parse(format!("{STREAM_PREFIX}{email}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Revoked,
}

impl InvitationStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
        }
    }
}

impl core::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationCreated {
    pub invitation_id: AggregateId,
    pub email: String,
    pub role: InvitationRole,
    pub occurred_at: DateTime<Utc>,
}

impl EventPayload for InvitationCreated {
    const EVENT_TYPE: &'static str = "InvitationCreated";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationAccepted {
    pub invitation_id: AggregateId,
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventPayload for InvitationAccepted {
    const EVENT_TYPE: &'static str = "InvitationAccepted";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationRevoked {
    pub invitation_id: AggregateId,
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventPayload for InvitationRevoked {
    const EVENT_TYPE: &'static str = "InvitationRevoked";
}

/// Every event an invitation can raise.
#[derive(Debug, Clone, PartialEq)]
pub enum InvitationEvent {
    Created(InvitationCreated),
    Accepted(InvitationAccepted),
    Revoked(InvitationRevoked),
}

/// Tags of all invitation events, for bus subscriptions.
pub const INVITATION_EVENT_TYPES: [&str; 3] = [
    InvitationCreated::EVENT_TYPE,
    InvitationAccepted::EVENT_TYPE,
    InvitationRevoked::EVENT_TYPE,
];

impl DomainEvent for InvitationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvitationEvent::Created(_) => InvitationCreated::EVENT_TYPE,
            InvitationEvent::Accepted(_) => InvitationAccepted::EVENT_TYPE,
            InvitationEvent::Revoked(_) => InvitationRevoked::EVENT_TYPE,
        }
    }

    fn aggregate_id(&self) -> &AggregateId {
        match self {
            InvitationEvent::Created(e) => &e.invitation_id,
            InvitationEvent::Accepted(e) => &e.invitation_id,
            InvitationEvent::Revoked(e) => &e.invitation_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvitationEvent::Created(e) => e.occurred_at,
            InvitationEvent::Accepted(e) => e.occurred_at,
            InvitationEvent::Revoked(e) => e.occurred_at,
        }
    }

    fn event_data(&self) -> Result<EventData, EventDataError> {
        match self {
            InvitationEvent::Created(e) => e.to_event_data(),
            InvitationEvent::Accepted(e) => e.to_event_data(),
            InvitationEvent::Revoked(e) => e.to_event_data(),
        }
    }
}

/// Decoder registry for invitation streams; build once at start-up.
pub fn invitation_event_registry() -> EventRegistry<InvitationEvent> {
    EventRegistry::new()
        .register(InvitationEvent::Created)
        .register(InvitationEvent::Accepted)
        .register(InvitationEvent::Revoked)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CreateInvitation {
    pub email: String,
    /// Raw role name; validated by the handler.
    pub role: String,
    pub occurred_at: DateTime<Utc>,
}

impl CreateInvitation {
    pub fn new(email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: role.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl Command for CreateInvitation {
    fn command_name(&self) -> &'static str {
        "CreateInvitation"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptInvitation {
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

impl AcceptInvitation {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl Command for AcceptInvitation {
    fn command_name(&self) -> &'static str {
        "AcceptInvitation"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevokeInvitation {
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

impl RevokeInvitation {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl Command for RevokeInvitation {
    fn command_name(&self) -> &'static str {
        "RevokeInvitation"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    base: AggregateBase<InvitationEvent>,
    email: String,
    role: InvitationRole,
    status: InvitationStatus,
}

impl Invitation {
    /// Label used in not-found errors.
    pub const AGGREGATE_TYPE: &'static str = "invitation";

    fn empty(id: AggregateId) -> Self {
        Self {
            base: AggregateBase::new(id),
            email: String::new(),
            role: InvitationRole::Viewer,
            status: InvitationStatus::Pending,
        }
    }

    /// Start a new invitation. The result is unsaved (version 1, one uncommitted event).
    pub fn create(
        email: &str,
        role: InvitationRole,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let email = normalize_email(email)?;
        let invitation_id = invitation_id_for(&email)?;

        let mut invitation = Self::empty(invitation_id.clone());
        invitation.raise(InvitationEvent::Created(InvitationCreated {
            invitation_id,
            email,
            role,
            occurred_at,
        }));
        Ok(invitation)
    }

    /// Rebuild from history. The first event must be `InvitationCreated`.
    pub fn reconstitute(
        id: AggregateId,
        history: Vec<InvitationEvent>,
    ) -> Result<Self, DomainError> {
        match history.first() {
            Some(InvitationEvent::Created(_)) => {}
            Some(other) => {
                return Err(DomainError::invariant(format!(
                    "invitation stream '{id}' starts with {} instead of {}",
                    other.event_type(),
                    InvitationCreated::EVENT_TYPE
                )));
            }
            None => {
                return Err(DomainError::invariant(format!(
                    "invitation stream '{id}' has no events"
                )));
            }
        }

        if let Some(stray) = history.iter().find(|e| e.aggregate_id() != &id) {
            return Err(DomainError::invariant(format!(
                "event for '{}' found in invitation stream '{id}'",
                stray.aggregate_id()
            )));
        }

        let mut invitation = Self::empty(id);
        invitation.replay_all(history);
        Ok(invitation)
    }

    pub fn accept(&mut self, occurred_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_pending("accept")?;
        self.raise(InvitationEvent::Accepted(InvitationAccepted {
            invitation_id: self.base.id().clone(),
            email: self.email.clone(),
            occurred_at,
        }));
        Ok(())
    }

    pub fn revoke(&mut self, occurred_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_pending("revoke")?;
        self.raise(InvitationEvent::Revoked(InvitationRevoked {
            invitation_id: self.base.id().clone(),
            email: self.email.clone(),
            occurred_at,
        }));
        Ok(())
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> InvitationRole {
        self.role
    }

    pub fn status(&self) -> InvitationStatus {
        self.status
    }

    fn ensure_pending(&self, action: &str) -> Result<(), DomainError> {
        if self.status.is_pending() {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "cannot {action} invitation for '{}': it is {}",
                self.email, self.status
            )))
        }
    }
}

impl EventSourced for Invitation {
    type Event = InvitationEvent;

    fn base(&self) -> &AggregateBase<InvitationEvent> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<InvitationEvent> {
        &mut self.base
    }

    fn apply(&mut self, event: &InvitationEvent) {
        match event {
            InvitationEvent::Created(e) => {
                self.email = e.email.clone();
                self.role = e.role;
                self.status = InvitationStatus::Pending;
            }
            InvitationEvent::Accepted(_) => self.status = InvitationStatus::Accepted,
            InvitationEvent::Revoked(_) => self.status = InvitationStatus::Revoked,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
