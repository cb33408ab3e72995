//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const MAX_TENANT_ID_LEN: usize = 64;
const MAX_AGGREGATE_ID_LEN: usize = 255;

/// Identifier of a tenant (multi-tenant isolation boundary).
///
/// Always normalised: trimmed, lower-cased, 1 to 64 characters from
/// `[a-z0-9_-]`, starting with a letter or digit. `system` and `synthetic` are
/// reserved for non-customer tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

/// Identifier of an aggregate, which is also the id of its event stream.
///
/// Only unique within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl TenantId {
    /// Tenant used by platform-internal processes.
    pub const SYSTEM: &'static str = "system";
    /// Tenant used for synthetic traffic (health checks, load tests).
    pub const SYNTHETIC: &'static str = "synthetic";

    const RESERVED: [&'static str; 2] = [Self::SYSTEM, Self::SYNTHETIC];

    /// Validate and normalise a raw tenant identifier.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(DomainError::invalid_id("TenantId: must not be empty"));
        }
        if normalized.len() > MAX_TENANT_ID_LEN {
            return Err(DomainError::invalid_id(format!(
                "TenantId: longer than {MAX_TENANT_ID_LEN} characters"
            )));
        }
        if !normalized.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_id(format!(
                "TenantId: '{normalized}' must start with a letter or digit"
            )));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(DomainError::invalid_id(format!(
                "TenantId: '{normalized}' contains invalid character {bad:?}"
            )));
        }

        Ok(Self(normalized))
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn synthetic() -> Self {
        Self(Self::SYNTHETIC.to_string())
    }

    /// Whether this is one of the reserved system/synthetic tenants.
    pub fn is_reserved(&self) -> bool {
        Self::RESERVED.contains(&self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AggregateId {
    /// Validate a raw aggregate identifier (non-empty, no whitespace, at most 255 chars).
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(DomainError::invalid_id("AggregateId: must not be empty"));
        }
        if raw.len() > MAX_AGGREGATE_ID_LEN {
            return Err(DomainError::invalid_id(format!(
                "AggregateId: longer than {MAX_AGGREGATE_ID_LEN} characters"
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_id(format!(
                "AggregateId: '{raw}' contains whitespace"
            )));
        }

        Ok(Self(raw))
    }

    /// Create a fresh identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$t>::parse(s)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                <$t>::parse(raw.as_str()).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_string_newtype!(TenantId);
impl_string_newtype!(AggregateId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_is_normalized() {
        let tenant = TenantId::parse("  Acme-Corp_01 ").unwrap();
        assert_eq!(tenant.as_str(), "acme-corp_01");
        assert_eq!(tenant, "ACME-CORP_01".parse().unwrap());
    }

    #[test]
    fn tenant_id_rejects_bad_input() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("   ").is_err());
        assert!(TenantId::parse("-leading-dash").is_err());
        assert!(TenantId::parse("has space").is_err());
        assert!(TenantId::parse("acme.corp").is_err());
        assert!(TenantId::parse(&"a".repeat(65)).is_err());
        assert!(TenantId::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn reserved_tenants_are_flagged() {
        assert!(TenantId::system().is_reserved());
        assert!(TenantId::synthetic().is_reserved());
        assert!(TenantId::parse("SYSTEM").unwrap().is_reserved());
        assert!(!TenantId::parse("acme").unwrap().is_reserved());
    }

    #[test]
    fn tenant_id_deserialization_validates() {
        let ok: TenantId = serde_json::from_str("\"Acme\"").unwrap();
        assert_eq!(ok.as_str(), "acme");
        assert!(serde_json::from_str::<TenantId>("\"bad tenant\"").is_err());
    }

    #[test]
    fn aggregate_id_validation() {
        assert!(AggregateId::parse("invitation:a@acme.com").is_ok());
        assert!(AggregateId::parse("").is_err());
        assert!(AggregateId::parse("with space").is_err());
        assert!(AggregateId::parse("x".repeat(256)).is_err());
    }

    #[test]
    fn generated_aggregate_ids_are_unique() {
        let a = AggregateId::generate();
        let b = AggregateId::generate();
        assert_ne!(a, b);
        assert!(AggregateId::parse(a.as_str()).is_ok());
    }
}
