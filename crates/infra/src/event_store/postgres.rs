//! Postgres-backed event store implementation.
//!
//! Tenant isolation, optimistic concurrency and append-only semantics are
//! enforced by the database as well as by the code:
//!
//! - every query filters on `tenant_id`
//! - `UNIQUE (tenant_id, aggregate_id, sequence_number)` turns two transactions
//!   racing for the same version into one winner and one unique violation
//! - each append runs in one transaction; if the future is dropped before the
//!   commit, the transaction is rolled back when the connection is returned
//!
//! ## Error mapping
//!
//! | sqlx error | code | `EventStoreError` |
//! |------------|------|-------------------|
//! | unique violation on insert | `23505` | `Concurrency` (actual version re-read) |
//! | check violation | `23514` | `InvalidAppend` |
//! | anything else | | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgExecutor, PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use strata_core::{AggregateId, TenantId};

use super::r#trait::{
    EventRecord, EventStore, EventStoreError, UncommittedEvent, check_batch_targets,
};

/// Table definition, applied statement by statement by [`PostgresEventStore::ensure_schema`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        global_position BIGSERIAL PRIMARY KEY,
        event_id        UUID        NOT NULL UNIQUE,
        tenant_id       TEXT        NOT NULL,
        aggregate_id    TEXT        NOT NULL,
        sequence_number BIGINT      NOT NULL CHECK (sequence_number > 0),
        event_type      TEXT        NOT NULL,
        payload         JSONB       NOT NULL,
        occurred_at     TIMESTAMPTZ NOT NULL,
        recorded_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT events_stream_sequence_key UNIQUE (tenant_id, aggregate_id, sequence_number)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS events_tenant_position_idx
        ON events (tenant_id, global_position)
    "#,
];

/// Postgres-backed append-only event store.
///
/// Cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `events` table and its indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip_all,
        fields(
            tenant_id = %tenant_id,
            stream_id = %stream_id,
            expected_version = expected_version,
            event_count = events.len(),
            committed = tracing::field::Empty
        ),
        err
    )]
    async fn append_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
        expected_version: u64,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        check_batch_targets(stream_id, &events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = stream_version(&mut *tx, tenant_id, stream_id).await?;
        if current != expected_version {
            // Dropping `tx` rolls back.
            return Err(EventStoreError::Concurrency {
                tenant_id: tenant_id.clone(),
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual: current,
            });
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next = current + 1;

        for event in events {
            let sequence_number = to_db_sequence(next)?;
            let payload = JsonValue::Object(event.payload);

            let inserted = sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    tenant_id,
                    aggregate_id,
                    sequence_number,
                    event_type,
                    payload,
                    occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_str())
            .bind(stream_id.as_str())
            .bind(sequence_number)
            .bind(&event.event_type)
            .bind(&payload)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    drop(tx);
                    // A concurrent writer committed first; report what it left behind.
                    let actual = stream_version(&self.pool, tenant_id, stream_id).await?;
                    tracing::warn!(
                        %tenant_id,
                        %stream_id,
                        expected_version,
                        actual,
                        "concurrent append detected"
                    );
                    return Err(EventStoreError::Concurrency {
                        tenant_id: tenant_id.clone(),
                        stream_id: stream_id.clone(),
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(map_sqlx_error("insert_event", e));
            }

            committed.push(EventRecord {
                event_id: event.event_id,
                tenant_id: tenant_id.clone(),
                stream_id: stream_id.clone(),
                sequence_number: next,
                event_type: event.event_type,
                payload,
                occurred_at: event.occurred_at,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("committed", committed.len());
        Ok(committed)
    }

    #[instrument(
        skip_all,
        fields(
            tenant_id = %tenant_id,
            stream_id = %stream_id,
            event_count = tracing::field::Empty
        ),
        err
    )]
    async fn load_stream(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, sequence_number,
                   event_type, payload, occurred_at
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(stream_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_events", e))?;

        decode_rows(tenant_id, rows)
    }

    #[instrument(
        skip_all,
        fields(tenant_id = %tenant_id, event_count = tracing::field::Empty),
        err
    )]
    async fn load_tenant(&self, tenant_id: &TenantId) -> Result<Vec<EventRecord>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, sequence_number,
                   event_type, payload, occurred_at
            FROM events
            WHERE tenant_id = $1
            ORDER BY global_position ASC
            "#,
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_tenant_events", e))?;

        decode_rows(tenant_id, rows)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
        expected_version: u64,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        self.append_events(tenant_id, stream_id, expected_version, events)
            .await
    }

    async fn load_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        self.load_stream(tenant_id, stream_id).await
    }

    async fn load_tenant_events(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        self.load_tenant(tenant_id).await
    }
}

/// Highest sequence number of a stream (0 when it does not exist).
async fn stream_version<'e, E>(
    executor: E,
    tenant_id: &TenantId,
    stream_id: &AggregateId,
) -> Result<u64, EventStoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_str())
    .bind(stream_id.as_str())
    .fetch_one(executor)
    .await
    .map_err(|e| map_sqlx_error("stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("stream_version", e))?;
    from_db_sequence(current)
}

fn decode_rows(
    tenant_id: &TenantId,
    rows: Vec<PgRow>,
) -> Result<Vec<EventRecord>, EventStoreError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let row = EventRow::from_row(row).map_err(|e| map_sqlx_error("decode_row", e))?;
        let record = EventRecord::try_from(row)?;
        if &record.tenant_id != tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "query for tenant '{tenant_id}' returned event {} of tenant '{}'",
                record.event_id, record.tenant_id
            )));
        }
        records.push(record);
    }
    Span::current().record("event_count", records.len());
    Ok(records)
}

fn to_db_sequence(sequence_number: u64) -> Result<i64, EventStoreError> {
    i64::try_from(sequence_number).map_err(|_| {
        EventStoreError::InvalidAppend(format!("sequence number {sequence_number} out of range"))
    })
}

fn from_db_sequence(sequence_number: i64) -> Result<u64, EventStoreError> {
    u64::try_from(sequence_number).map_err(|_| {
        EventStoreError::Backend(format!("negative sequence number {sequence_number} in store"))
    })
}

/// Map sqlx errors to `EventStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[derive(Debug)]
struct EventRow {
    event_id: Uuid,
    tenant_id: String,
    aggregate_id: String,
    sequence_number: i64,
    event_type: String,
    payload: JsonValue,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            event_id: row.try_get("event_id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<EventRow> for EventRecord {
    type Error = EventStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: strata_core::DomainError| {
            EventStoreError::Backend(format!("event {} has invalid {what}: {e}", row.event_id))
        };

        Ok(EventRecord {
            event_id: row.event_id,
            tenant_id: TenantId::parse(&row.tenant_id).map_err(|e| corrupt("tenant_id", e))?,
            stream_id: AggregateId::parse(row.aggregate_id.as_str())
                .map_err(|e| corrupt("aggregate_id", e))?,
            sequence_number: from_db_sequence(row.sequence_number)?,
            event_type: row.event_type,
            payload: row.payload,
            occurred_at: row.occurred_at,
        })
    }
}
