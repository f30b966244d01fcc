//! Cloud provider: remote store first, local mirror as fallback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::UrusResult;
use crate::model::Table;
use crate::store::local::LocalStore;
use crate::store::queue::{OfflineQueue, QueueItem, QueueReport};
use crate::store::remote::RemoteStore;
use crate::store::{ProviderKind, StorageProvider};

/// Reads come from the remote and are mirrored locally; when the remote is
/// unreachable the mirror answers instead. Writes land in the mirror first
/// and are queued for replay when the remote rejects them.
pub struct CloudProvider {
    remote: Arc<dyn RemoteStore>,
    mirror: LocalStore,
    queue: OfflineQueue,
}

impl CloudProvider {
    pub fn new(remote: Arc<dyn RemoteStore>, mirror: LocalStore) -> Self {
        let queue = OfflineQueue::new(mirror.clone());
        CloudProvider {
            remote,
            mirror,
            queue,
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub async fn process_offline_queue(&self) -> UrusResult<QueueReport> {
        self.queue.process(self.remote.as_ref()).await
    }
}

#[async_trait]
impl StorageProvider for CloudProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn load(&self, table: Table, since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>> {
        match self.remote.fetch(table, since).await {
            Ok(records) => {
                if !records.is_empty() {
                    self.mirror.upsert(table, &records)?;
                }
                // A full load answers with the mirror so writes still waiting
                // in the offline queue are not lost from view.
                match since {
                    Some(_) => Ok(records),
                    None => self.mirror.read_table(table),
                }
            }
            Err(e) => {
                log::warn!("Cloud: fetching {} failed, using local mirror: {}", table, e);
                self.mirror.read_table(table)
            }
        }
    }

    async fn save(&self, table: Table, records: Vec<Value>) -> UrusResult<()> {
        self.mirror.upsert(table, &records)?;

        if let Err(e) = self.remote.upsert(table, &records).await {
            log::warn!("Cloud: saving {} failed, queueing: {}", table, e);
            self.queue.push(QueueItem::Upsert { table, records })?;
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> UrusResult<()> {
        self.mirror.delete(table, id)?;

        if let Err(e) = self.remote.delete(table, id).await {
            log::warn!("Cloud: deleting {} from {} failed, queueing: {}", id, table, e);
            self.queue.push(QueueItem::Delete {
                table,
                id: id.to_string(),
            })?;
        }
        Ok(())
    }

    /// Wipes the local mirror only; the account's remote data is untouched.
    async fn clear_all(&self) -> UrusResult<()> {
        self.mirror.clear_tables()
    }
}
