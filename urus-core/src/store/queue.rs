//! Persisted queue of cloud writes that could not be delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UrusResult;
use crate::model::Table;
use crate::store::local::LocalStore;
use crate::store::remote::RemoteStore;

const QUEUE_KEY: &str = "offline_queue";
/// Pause between replayed writes so a long queue doesn't hammer the backend.
const REPLAY_THROTTLE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueItem {
    Upsert { table: Table, records: Vec<Value> },
    Delete { table: Table, id: String },
}

impl QueueItem {
    fn table(&self) -> Table {
        match self {
            QueueItem::Upsert { table, .. } | QueueItem::Delete { table, .. } => *table,
        }
    }

    async fn apply(&self, remote: &dyn RemoteStore) -> UrusResult<()> {
        match self {
            QueueItem::Upsert { table, records } => remote.upsert(*table, records).await,
            QueueItem::Delete { table, id } => remote.delete(*table, id).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub synced: usize,
    pub remaining: usize,
}

#[derive(Debug)]
pub struct OfflineQueue {
    store: LocalStore,
    processing: AtomicBool,
    /// Held across every read-modify-write of the persisted queue.
    writes: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: LocalStore) -> Self {
        OfflineQueue {
            store,
            processing: AtomicBool::new(false),
            writes: Mutex::new(()),
        }
    }

    pub fn items(&self) -> UrusResult<Vec<QueueItem>> {
        self.store
            .get_state(QUEUE_KEY)
            .map(Option::unwrap_or_default)
    }

    pub fn len(&self) -> usize {
        self.items().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, item: QueueItem) -> UrusResult<()> {
        let _guard = self.writes.lock();
        let mut items = self.items()?;
        log::info!("Offline: queued {} write for later sync", item.table());
        items.push(item);
        self.store.set_state(QUEUE_KEY, &items)
    }

    pub fn clear(&self) -> UrusResult<()> {
        let _guard = self.writes.lock();
        self.store.remove_state(QUEUE_KEY)
    }

    /// Replay queued writes in order. Items that fail stay queued, as do
    /// items pushed while the replay runs. A replay already running makes
    /// this call a no-op.
    pub async fn process(&self, remote: &dyn RemoteStore) -> UrusResult<QueueReport> {
        if self.processing.swap(true, Ordering::AcqRel) {
            return Ok(QueueReport::default());
        }

        let result = self.replay(remote).await;
        self.processing.store(false, Ordering::Release);
        result
    }

    async fn replay(&self, remote: &dyn RemoteStore) -> UrusResult<QueueReport> {
        let snapshot = self.items()?;
        if snapshot.is_empty() {
            return Ok(QueueReport::default());
        }
        let replayed = snapshot.len();
        log::info!("Syncing {} offline writes", replayed);

        let mut failed = Vec::new();
        let mut synced = 0;
        for (i, item) in snapshot.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REPLAY_THROTTLE).await;
            }
            match item.apply(remote).await {
                Ok(()) => synced += 1,
                Err(e) => {
                    log::warn!("Offline write for {} failed again: {}", item.table(), e);
                    failed.push(item);
                }
            }
        }

        let _guard = self.writes.lock();
        // Pushes only ever append, so whatever lies past the snapshot arrived
        // during the replay.
        let mut remaining = failed;
        remaining.extend(self.items()?.into_iter().skip(replayed));

        if remaining.is_empty() {
            self.store.remove_state(QUEUE_KEY)?;
        } else {
            self.store.set_state(QUEUE_KEY, &remaining)?;
        }

        Ok(QueueReport {
            synced,
            remaining: remaining.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemote;
    use serde_json::json;

    fn queue() -> (tempfile::TempDir, OfflineQueue) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        (dir, OfflineQueue::new(store))
    }

    fn upsert(id: &str) -> QueueItem {
        QueueItem::Upsert {
            table: Table::Priorities,
            records: vec![json!({"id": id})],
        }
    }

    #[tokio::test]
    async fn test_failed_items_stay_queued() {
        let (_dir, queue) = queue();
        let remote = MemoryRemote::default();
        queue.push(upsert("a")).unwrap();
        remote.set_offline(true);

        let report = queue.process(&remote).await.unwrap();
        assert_eq!(report, QueueReport { synced: 0, remaining: 1 });
        assert_eq!(queue.items().unwrap(), vec![upsert("a")]);
    }

    #[tokio::test]
    async fn test_push_during_replay_is_kept() {
        let (_dir, queue) = queue();
        let remote = MemoryRemote::default();
        queue.push(upsert("a")).unwrap();
        queue.push(upsert("b")).unwrap();

        let late = QueueItem::Delete {
            table: Table::Priorities,
            id: "c".into(),
        };
        let (report, pushed) = tokio::join!(queue.process(&remote), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            queue.push(late.clone())
        });
        pushed.unwrap();

        assert_eq!(report.unwrap(), QueueReport { synced: 2, remaining: 1 });
        assert_eq!(queue.items().unwrap(), vec![late]);
        assert_eq!(remote.records(Table::Priorities).len(), 2);
    }
}
