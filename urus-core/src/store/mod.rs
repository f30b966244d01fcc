//! Storage providers.
//!
//! A provider is where the storage layer reads and writes collections. The
//! local provider talks only to the on-disk store; the cloud provider talks to
//! a remote store and keeps the on-disk store as a mirror.

mod cloud;
mod local;
mod queue;
mod remote;

pub use cloud::CloudProvider;
pub use local::{LocalStore, StoreLock};
pub use queue::{OfflineQueue, QueueItem, QueueReport};
pub use remote::{Credentials, HttpRemote, RemoteStore, User};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::UrusResult;
use crate::model::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Cloud,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Cloud => write!(f, "cloud"),
        }
    }
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Load a collection. `since` asks for records changed after that instant;
    /// providers without change tracking may ignore it and return everything.
    async fn load(&self, table: Table, since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>>;

    /// Insert or replace records by id.
    async fn save(&self, table: Table, records: Vec<Value>) -> UrusResult<()>;

    async fn delete(&self, table: Table, id: &str) -> UrusResult<()>;

    /// Wipe locally persisted collections.
    async fn clear_all(&self) -> UrusResult<()>;
}

/// Provider for guest mode: the on-disk store only.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    store: LocalStore,
}

impl LocalProvider {
    pub fn new(store: LocalStore) -> Self {
        LocalProvider { store }
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn load(&self, table: Table, _since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>> {
        self.store.read_table(table)
    }

    async fn save(&self, table: Table, records: Vec<Value>) -> UrusResult<()> {
        self.store.upsert(table, &records)
    }

    async fn delete(&self, table: Table, id: &str) -> UrusResult<()> {
        self.store.delete(table, id)
    }

    async fn clear_all(&self) -> UrusResult<()> {
        self.store.clear_tables()
    }
}
