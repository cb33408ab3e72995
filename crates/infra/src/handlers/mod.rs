//! Command handlers wiring domain aggregates to repositories.

pub mod invitations;

pub use invitations::{
    AcceptInvitationHandler, CreateInvitationHandler, InvitationRepository, RevokeInvitationHandler,
    invitation_repository, register_invitation_handlers,
};
