//! Runtime configuration loaded from the environment.
//!
//! | variable | default |
//! |----------|---------|
//! | `STRATA_DATABASE_URL` | unset: in-memory event store |
//! | `STRATA_DB_MAX_CONNECTIONS` | 5 |
//! | `STRATA_PROJECTION_QUEUE_CAPACITY` | 0: projectors run inline; N > 0 queues them on a worker |

use thiserror::Error;

pub const DATABASE_URL: &str = "STRATA_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STRATA_DB_MAX_CONNECTIONS";
pub const PROJECTION_QUEUE_CAPACITY: &str = "STRATA_PROJECTION_QUEUE_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrataConfig {
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Bounded queue size per projection worker. 0 (the default) runs
    /// projectors inside the publishing call.
    pub projection_queue_capacity: usize,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            projection_queue_capacity: 0,
        }
    }
}

impl StrataConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map instead of the process env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = match lookup(DATABASE_URL) {
            Some(url) if url.trim().is_empty() => return Err(ConfigError::Empty(DATABASE_URL)),
            other => other,
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, DB_MAX_CONNECTIONS, defaults.db_max_connections)?,
            projection_queue_capacity: parse_or(
                &lookup,
                PROJECTION_QUEUE_CAPACITY,
                defaults.projection_queue_capacity,
            )?,
        })
    }

    pub fn uses_postgres(&self) -> bool {
        self.database_url.is_some()
    }
}

fn parse_or<T: core::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
    }
}
