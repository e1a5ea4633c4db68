//! Typed change events for project records.
//!
//! Writers publish after the row is stored; subscribers receive a stream of
//! events for one project. Delivery order is the publish order. Lagging
//! subscribers skip what they missed and are expected to refetch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Projects,
    Materials,
    Labour,
    Files,
    Checklist,
    Tasks,
    Team,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub project_id: String,
    pub record_id: String,
    /// Row after the change; `null` for deletions.
    pub record: serde_json::Value,
}

impl ChangeEvent {
    pub fn inserted<T: Serialize>(table: Table, project_id: &str, id: &str, record: &T) -> Self {
        Self::with_record(table, ChangeKind::Inserted, project_id, id, record)
    }

    pub fn updated<T: Serialize>(table: Table, project_id: &str, id: &str, record: &T) -> Self {
        Self::with_record(table, ChangeKind::Updated, project_id, id, record)
    }

    pub fn deleted(table: Table, project_id: &str, id: &str) -> Self {
        Self {
            table,
            kind: ChangeKind::Deleted,
            project_id: project_id.to_string(),
            record_id: id.to_string(),
            record: serde_json::Value::Null,
        }
    }

    fn with_record<T: Serialize>(
        table: Table,
        kind: ChangeKind,
        project_id: &str,
        id: &str,
        record: &T,
    ) -> Self {
        Self {
            table,
            kind,
            project_id: project_id.to_string(),
            record_id: id.to_string(),
            record: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Records that can be merged by id.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Apply an event to a local list: insert-or-replace for inserts and
/// updates, removal for deletes. Records that fail to decode are ignored.
pub fn merge_by_id<T>(items: &mut Vec<T>, event: &ChangeEvent)
where
    T: Identified + serde::de::DeserializeOwned,
{
    match event.kind {
        ChangeKind::Deleted => items.retain(|item| item.id() != event.record_id),
        ChangeKind::Inserted | ChangeKind::Updated => {
            let Ok(record) = serde_json::from_value::<T>(event.record.clone()) else {
                tracing::debug!(record_id = %event.record_id, "skipping undecodable change event");
                return;
            };
            match items.iter_mut().find(|item| item.id() == event.record_id) {
                Some(existing) => *existing = record,
                None => items.push(record),
            }
        }
    }
}

/// One broadcast channel per project, created on first use.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, project_id: &str) -> broadcast::Sender<ChangeEvent> {
        {
            let channels = self.channels.read().await;
            if let Some(tx) = channels.get(project_id) {
                return tx.clone();
            }
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish to the project's subscribers; returns how many received it.
    pub async fn publish(&self, event: ChangeEvent) -> usize {
        let tx = {
            let channels = self.channels.read().await;
            channels.get(&event.project_id).cloned()
        };
        match tx {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn subscribe(&self, project_id: &str) -> BoxStream<'static, ChangeEvent> {
        let rx = self.sender(project_id).await.subscribe();
        BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::debug!(error = %e, "change subscriber lagged");
                    None
                }
            }
        })
        .boxed()
    }

    /// Drop the project's channel, ending every subscription to it.
    pub async fn close(&self, project_id: &str) {
        self.channels.write().await.remove(project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        qty: u32,
    }

    impl Identified for Row {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str, qty: u32) -> Row {
        Row {
            id: id.to_string(),
            qty,
        }
    }

    #[test]
    fn merge_inserts_replaces_and_removes() {
        let mut rows = vec![row("a", 1)];

        merge_by_id(&mut rows, &ChangeEvent::inserted(Table::Materials, "p", "b", &row("b", 2)));
        assert_eq!(rows.len(), 2);

        merge_by_id(&mut rows, &ChangeEvent::updated(Table::Materials, "p", "a", &row("a", 5)));
        assert_eq!(rows[0].qty, 5);

        merge_by_id(&mut rows, &ChangeEvent::deleted(Table::Materials, "p", "a"));
        assert_eq!(rows, vec![row("b", 2)]);
    }

    #[test]
    fn duplicate_insert_does_not_duplicate() {
        let mut rows = vec![row("a", 1)];
        merge_by_id(&mut rows, &ChangeEvent::inserted(Table::Labour, "p", "a", &row("a", 3)));
        assert_eq!(rows, vec![row("a", 3)]);
    }

    #[tokio::test]
    async fn subscribers_only_see_their_project() {
        let bus = EventBus::new();
        let mut first = bus.subscribe("p1").await;
        let _second = bus.subscribe("p2").await;

        assert_eq!(bus.publish(ChangeEvent::deleted(Table::Files, "p2", "x")).await, 1);
        assert_eq!(bus.publish(ChangeEvent::deleted(Table::Files, "p1", "y")).await, 1);

        let event = first.next().await.unwrap();
        assert_eq!(event.record_id, "y");
        assert_eq!(event.kind, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(ChangeEvent::deleted(Table::Tasks, "p", "t")).await, 0);
    }
}
