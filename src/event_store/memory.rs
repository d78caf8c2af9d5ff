//! In-memory event store
//!
//! One mutex per stream: appends to the same aggregate serialize,
//! appends to different aggregates never contend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Appended, EventStore, EventStoreError, NewEvent, StoredEvent, StreamInfo};

#[derive(Debug)]
struct Stream {
    aggregate_type: String,
    events: Vec<StoredEvent>,
}

#[derive(Debug, Default)]
struct Streams {
    by_id: HashMap<Uuid, Arc<Mutex<Stream>>>,
    /// Creation order, so listings are stable
    order: Vec<Uuid>,
}

/// Event store kept in process memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<Streams>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn stream(&self, aggregate_id: Uuid) -> Option<Arc<Mutex<Stream>>> {
        self.streams.read().await.by_id.get(&aggregate_id).cloned()
    }

    async fn stream_or_insert(&self, aggregate_type: &str, aggregate_id: Uuid) -> Arc<Mutex<Stream>> {
        if let Some(stream) = self.stream(aggregate_id).await {
            return stream;
        }

        let mut streams = self.streams.write().await;
        if let Some(stream) = streams.by_id.get(&aggregate_id) {
            return stream.clone();
        }
        let stream = Arc::new(Mutex::new(Stream {
            aggregate_type: aggregate_type.to_string(),
            events: Vec::new(),
        }));
        streams.by_id.insert(aggregate_id, stream.clone());
        streams.order.push(aggregate_id);
        stream
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Appended, EventStoreError> {
        let stream = self.stream_or_insert(aggregate_type, aggregate_id).await;
        let mut stream = stream.lock().await;

        let current_version = stream.events.len() as i64;
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        if stream.events.is_empty() {
            stream.aggregate_type = aggregate_type.to_string();
        }

        let recorded_at = Utc::now();
        let stored: Vec<StoredEvent> = events
            .into_iter()
            .enumerate()
            .map(|(idx, event)| StoredEvent {
                id: Uuid::new_v4(),
                aggregate_type: aggregate_type.to_string(),
                aggregate_id,
                sequence_number: expected_version + idx as i64 + 1,
                event_type: event.event_type,
                payload: event.payload,
                recorded_at,
                caused_by: event.caused_by,
            })
            .collect();

        stream.events.extend(stored.iter().cloned());

        Ok(Appended {
            new_version: stream.events.len() as i64,
            events: stored,
        })
    }

    async fn load_from(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(stream) = self.stream(aggregate_id).await else {
            return Ok(Vec::new());
        };
        let stream = stream.lock().await;
        let skip = after_version.clamp(0, stream.events.len() as i64) as usize;
        Ok(stream.events[skip..].to_vec())
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        match self.stream(aggregate_id).await {
            Some(stream) => Ok(stream.lock().await.events.len() as i64),
            None => Ok(0),
        }
    }

    async fn streams(&self) -> Result<Vec<StreamInfo>, EventStoreError> {
        let handles: Vec<(Uuid, Arc<Mutex<Stream>>)> = {
            let streams = self.streams.read().await;
            streams
                .order
                .iter()
                .filter_map(|id| streams.by_id.get(id).map(|s| (*id, s.clone())))
                .collect()
        };

        let mut infos = Vec::with_capacity(handles.len());
        for (aggregate_id, stream) in handles {
            let stream = stream.lock().await;
            if stream.events.is_empty() {
                continue;
            }
            infos.push(StreamInfo {
                aggregate_id,
                aggregate_type: stream.aggregate_type.clone(),
                version: stream.events.len() as i64,
            });
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_event(n: u32) -> NewEvent {
        NewEvent {
            event_type: "PersonDetailsUpdated".to_string(),
            payload: json!({ "n": n }),
            caused_by: None,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_gapless_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        let first = store.append("Person", id, 0, vec![new_event(1), new_event(2)]).await.unwrap();
        assert_eq!(first.new_version, 2);
        assert_eq!(
            first.events.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let second = store.append("Person", id, 2, vec![new_event(3)]).await.unwrap();
        assert_eq!(second.events[0].sequence_number, 3);

        let all = store.load(id).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].payload["n"], 3);

        let tail = store.load_from(id, 1).await.unwrap();
        assert_eq!(tail.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_stale_expected_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();
        store.append("Person", id, 0, vec![new_event(1)]).await.unwrap();

        let err = store.append("Person", id, 0, vec![new_event(2)]).await.unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::ConcurrencyConflict { expected: 0, actual: 1, .. }
        ));
        assert_eq!(store.current_version(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_empty() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        assert!(store.load(id).await.unwrap().is_empty());
        assert_eq!(store.current_version(id).await.unwrap(), 0);
        assert!(store.load_from(id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streams_lists_in_creation_order() {
        let store = InMemoryEventStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.append("Family", b, 0, vec![new_event(1)]).await.unwrap();
        store.append("Person", a, 0, vec![new_event(1), new_event(2)]).await.unwrap();
        // a failed first append leaves no visible stream
        let _ = store.append("Person", Uuid::new_v4(), 3, vec![new_event(1)]).await;

        let streams = store.streams().await.unwrap();
        assert_eq!(
            streams,
            vec![
                StreamInfo { aggregate_id: b, aggregate_type: "Family".to_string(), version: 1 },
                StreamInfo { aggregate_id: a, aggregate_type: "Person".to_string(), version: 2 },
            ]
        );
    }
}
