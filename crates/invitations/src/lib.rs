//! `strata-invitations`: tenant user invitations (event-sourced).
//!
//! A small domain crate: an invitation is created for an email with a role and
//! then either accepted or revoked, exactly once.

pub mod invitation;
pub mod role;

pub use invitation::{
    AcceptInvitation, CreateInvitation, INVITATION_EVENT_TYPES, Invitation, InvitationAccepted,
    InvitationCreated, InvitationEvent, InvitationRevoked, InvitationStatus, RevokeInvitation,
    invitation_event_registry, invitation_id_for, normalize_email,
};
pub use role::InvitationRole;
