use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use strata_core::{AggregateId, TenantId};

use super::r#trait::{
    EventRecord, EventStore, EventStoreError, UncommittedEvent, check_batch_targets,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    stream_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    /// Every record in commit order.
    log: Vec<EventRecord>,
    /// Positions in `log`, per stream, ascending.
    streams: HashMap<StreamKey, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. The version check and the append happen inside one
/// write-lock critical section with no await point, so racing appends on the
/// same stream serialise and exactly one of them wins.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all tenants.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn stream_count(&self) -> usize {
        self.inner.read().map(|inner| inner.streams.len()).unwrap_or(0)
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Backend("in-memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
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

        let key = StreamKey {
            tenant_id: tenant_id.clone(),
            stream_id: stream_id.clone(),
        };

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Inner { log, streams } = &mut *inner;

        let current = streams.get(&key).map_or(0, Vec::len) as u64;

        if current != expected_version {
            tracing::debug!(
                %tenant_id,
                %stream_id,
                expected_version,
                actual = current,
                "append rejected: stream moved"
            );
            return Err(EventStoreError::Concurrency {
                tenant_id: tenant_id.clone(),
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual: current,
            });
        }

        // Only a successful append creates the stream entry.
        let positions = streams.entry(key).or_default();
        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let record = EventRecord {
                event_id: e.event_id,
                tenant_id: tenant_id.clone(),
                stream_id: stream_id.clone(),
                sequence_number: current + 1 + offset as u64,
                event_type: e.event_type,
                payload: JsonValue::Object(e.payload),
                occurred_at: e.occurred_at,
            };
            positions.push(log.len());
            log.push(record.clone());
            committed.push(record);
        }

        tracing::debug!(
            %tenant_id,
            %stream_id,
            count = committed.len(),
            version = current + committed.len() as u64,
            "appended events"
        );
        Ok(committed)
    }

    async fn load_events(
        &self,
        tenant_id: &TenantId,
        stream_id: &AggregateId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let key = StreamKey {
            tenant_id: tenant_id.clone(),
            stream_id: stream_id.clone(),
        };

        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let records = inner
            .streams
            .get(&key)
            .map(|positions| positions.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default();
        Ok(records)
    }

    async fn load_tenant_events(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .log
            .iter()
            .filter(|record| &record.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn tenant(raw: &str) -> TenantId {
        TenantId::parse(raw).unwrap()
    }

    fn stream(raw: &str) -> AggregateId {
        AggregateId::parse(raw).unwrap()
    }

    fn event(stream_id: &AggregateId, n: i64) -> UncommittedEvent {
        let payload = match json!({ "n": n }) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        };
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: stream_id.clone(),
            event_type: "Counted".to_string(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    #[tokio::test]
    async fn assigns_consecutive_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let (t, s) = (tenant("acme"), stream("counter-1"));

        let first = store
            .append(&t, &s, 0, vec![event(&s, 1), event(&s, 2)])
            .await
            .unwrap();
        let second = store.append(&t, &s, 2, vec![event(&s, 3)]).await.unwrap();

        let seqs: Vec<u64> = first
            .iter()
            .chain(second.iter())
            .map(|r| r.sequence_number)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let loaded = store.load_events(&t, &s).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].payload, json!({ "n": 3 }));
    }

    #[tokio::test]
    async fn stale_expected_version_is_rejected_without_writing() {
        let store = InMemoryEventStore::new();
        let (t, s) = (tenant("acme"), stream("counter-1"));
        store.append(&t, &s, 0, vec![event(&s, 1)]).await.unwrap();

        let err = store
            .append(&t, &s, 0, vec![event(&s, 99)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::Concurrency {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.load_events(&t, &s).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_append_leaves_no_stream_behind() {
        let store = InMemoryEventStore::new();
        let acme = tenant("acme");
        let s1 = stream("s-1");

        let err = store
            .append(&acme, &s1, 5, vec![event(&s1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::Concurrency {
                expected: 5,
                actual: 0,
                ..
            }
        ));
        assert!(store.is_empty());
        assert_eq!(store.stream_count(), 0);

        store.append(&acme, &s1, 0, vec![event(&s1, 1)]).await.unwrap();
        assert_eq!(store.stream_count(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let store = InMemoryEventStore::new();
        let (t, s) = (tenant("acme"), stream("counter-1"));

        let records = store.append(&t, &s, 7, vec![]).await.unwrap();
        assert!(records.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn batch_for_another_stream_is_invalid() {
        let store = InMemoryEventStore::new();
        let t = tenant("acme");
        let (s, other) = (stream("counter-1"), stream("counter-2"));

        let err = store
            .append(&t, &s, 0, vec![event(&s, 1), event(&other, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn streams_are_scoped_per_tenant() {
        let store = InMemoryEventStore::new();
        let s = stream("shared-id");
        let (acme, globex) = (tenant("acme"), tenant("globex"));

        store.append(&acme, &s, 0, vec![event(&s, 1)]).await.unwrap();
        // Same stream id, other tenant: independent stream starting at version 0.
        store.append(&globex, &s, 0, vec![event(&s, 2)]).await.unwrap();

        let acme_events = store.load_events(&acme, &s).await.unwrap();
        assert_eq!(acme_events.len(), 1);
        assert_eq!(acme_events[0].payload, json!({ "n": 1 }));

        let unknown = tenant("initech");
        assert!(store.load_events(&unknown, &s).await.unwrap().is_empty());
        assert!(store.load_tenant_events(&unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_events_come_back_in_commit_order() {
        let store = InMemoryEventStore::new();
        let t = tenant("acme");
        let (a, b) = (stream("a"), stream("b"));

        store.append(&t, &a, 0, vec![event(&a, 1)]).await.unwrap();
        store.append(&t, &b, 0, vec![event(&b, 2)]).await.unwrap();
        store.append(&t, &a, 1, vec![event(&a, 3)]).await.unwrap();

        let order: Vec<(String, u64)> = store
            .load_tenant_events(&t)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.stream_id.to_string(), r.sequence_number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2)
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_appends_have_exactly_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let (t, s) = (tenant("acme"), stream("contended"));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let (store, t, s) = (Arc::clone(&store), t.clone(), s.clone());
            tasks.push(tokio::spawn(async move {
                store.append(&t, &s, 0, vec![event(&s, n)]).await
            }));
        }

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(e.is_concurrency_conflict()),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.load_events(&t, &s).await.unwrap().len(), 1);
    }
}
