use core::str::FromStr;

use serde::{Deserialize, Serialize};

use strata_core::DomainError;

/// Role granted to the invitee once the invitation is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationRole {
    Admin,
    Architect,
    Viewer,
}

impl InvitationRole {
    pub const ALL: [InvitationRole; 3] = [Self::Admin, Self::Architect, Self::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationRole::Admin => "admin",
            InvitationRole::Architect => "architect",
            InvitationRole::Viewer => "viewer",
        }
    }
}

impl core::fmt::Display for InvitationRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "architect" => Ok(Self::Architect),
            "viewer" => Ok(Self::Viewer),
            other => Err(DomainError::validation(format!(
                "unknown role '{other}' (expected admin, architect or viewer)"
            ))),
        }
    }
}
