//! The storage layer.
//!
//! Owns the in-memory cache and the active provider. UI-facing code reads
//! through `list` and mutates through the typed operations here; every
//! mutation and every completed hydration is broadcast to change listeners.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::cache::Cache;
use crate::error::{UrusError, UrusResult};
use crate::flight::{Flight, flight};
use crate::model::{
    ActivityLog, Habit, HabitLog, Note, PriorityTask, Record, Reflection, RoutineItem, Table,
    generate_id,
};
use crate::observers::{ListenerId, Observers};
use crate::store::{LocalStore, ProviderKind, StorageProvider};
use crate::time::parse_hhmm;

const SYNC_TOKENS_KEY: &str = "sync_tokens";

type HydrationOutcome = Result<(), String>;

/// Per-user "changed since" markers for incremental cloud hydration.
type SyncTokens = HashMap<String, HashMap<Table, DateTime<Utc>>>;

/// Live record counts per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts(pub HashMap<Table, usize>);

impl Counts {
    pub fn get(&self, table: Table) -> usize {
        self.0.get(&table).copied().unwrap_or(0)
    }
}

pub struct Storage {
    local: LocalStore,
    provider: RwLock<Arc<dyn StorageProvider>>,
    cache: Mutex<Cache>,
    changes: Observers<()>,
    hydration: Mutex<Option<Flight<HydrationOutcome>>>,
    current_user: Mutex<Option<String>>,
    include_guest: AtomicBool,
}

impl Storage {
    pub fn new(local: LocalStore, provider: Arc<dyn StorageProvider>) -> Self {
        Storage {
            local,
            provider: RwLock::new(provider),
            cache: Mutex::new(Cache::default()),
            changes: Observers::default(),
            hydration: Mutex::new(None),
            current_user: Mutex::new(None),
            include_guest: AtomicBool::new(false),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn provider(&self) -> Arc<dyn StorageProvider> {
        Arc::clone(&self.provider.read())
    }

    /// Swap the active provider. The cache is left as is; callers decide
    /// whether the identity change warrants a reset.
    pub fn set_provider(&self, provider: Arc<dyn StorageProvider>) {
        log::info!("Storage: {} mode", provider.kind());
        *self.provider.write() = provider;
    }

    pub fn is_cloud_active(&self) -> bool {
        self.provider().kind() == ProviderKind::Cloud
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.current_user.lock().clone()
    }

    pub fn set_current_user_id(&self, user_id: Option<String>) {
        *self.current_user.lock() = user_id;
    }

    /// While set, cloud hydration also loads the guest collections kept in
    /// the local store, so a signed-in user sees both until they decide
    /// what happens to the guest data.
    pub fn set_include_guest_data(&self, include: bool) {
        self.include_guest.store(include, Ordering::SeqCst);
    }

    pub fn includes_guest_data(&self) -> bool {
        self.include_guest.load(Ordering::SeqCst)
    }

    // LISTENERS:

    pub fn on_change(&self, listener: impl Fn(&()) + Send + Sync + 'static) -> ListenerId {
        self.changes.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.changes.remove(id)
    }

    fn notify(&self) {
        self.changes.notify(&());
    }

    // HYDRATION:

    /// Load every collection from the active provider into the cache.
    ///
    /// Concurrent calls share one run. `force` starts a fresh run regardless
    /// and ignores sync tokens, fetching full collections.
    pub async fn hydrate_cache(&self, force: bool) -> UrusResult<()> {
        let joined = {
            let mut pending = self.hydration.lock();
            match pending.as_ref() {
                Some(running) if !force => Err(running.clone()),
                _ => {
                    let (done, handle) = flight();
                    *pending = Some(handle.clone());
                    Ok((done, handle))
                }
            }
        };

        let (done, handle) = match joined {
            Ok(started) => started,
            Err(running) => {
                return match running.wait().await {
                    Some(Ok(())) | None => Ok(()),
                    Some(Err(message)) => Err(UrusError::Hydration(message)),
                };
            }
        };

        log::debug!("Storage: hydrating cache (force: {})", force);
        let result = self.hydrate_all(force).await;

        {
            let mut pending = self.hydration.lock();
            if pending.as_ref().is_some_and(|p| p.same_as(&handle)) {
                *pending = None;
            }
        }
        done.resolve(result.as_ref().map(|_| ()).map_err(|e| e.to_string()));

        if result.is_ok() {
            self.notify();
        }
        result
    }

    async fn hydrate_all(&self, force: bool) -> UrusResult<()> {
        tokio::try_join!(
            self.hydrate_table::<PriorityTask>(force),
            self.hydrate_table::<RoutineItem>(force),
            self.hydrate_table::<Note>(force),
            self.hydrate_table::<Reflection>(force),
            self.hydrate_table::<ActivityLog>(force),
            self.hydrate_table::<Habit>(force),
            self.hydrate_table::<HabitLog>(force),
        )?;
        Ok(())
    }

    async fn hydrate_table<T: Record>(&self, force: bool) -> UrusResult<()> {
        let provider = self.provider();
        let cloud = provider.kind() == ProviderKind::Cloud;
        let since = if force || !cloud {
            None
        } else {
            self.sync_token(T::TABLE)
        };

        let mut incoming: Vec<T> = decode_records(T::TABLE, provider.load(T::TABLE, since).await?);
        let newest = incoming.iter().filter_map(|r| r.updated_at()).max();

        if cloud && self.includes_guest_data() {
            incoming.extend(decode_records::<T>(T::TABLE, self.local.read_table(T::TABLE)?));
        }

        self.cache.lock().absorb(incoming);

        if cloud && let Some(newest) = newest {
            let marker = since.map_or(newest, |s| s.max(newest));
            self.set_sync_token(T::TABLE, marker)?;
        }
        Ok(())
    }

    // SYNC TOKENS:

    fn sync_tokens(&self) -> SyncTokens {
        self.local
            .get_state(SYNC_TOKENS_KEY)
            .unwrap_or_else(|e| {
                log::warn!("Storage: ignoring unreadable sync tokens: {}", e);
                None
            })
            .unwrap_or_default()
    }

    pub fn sync_token(&self, table: Table) -> Option<DateTime<Utc>> {
        let user = self.current_user_id()?;
        self.sync_tokens().get(&user)?.get(&table).copied()
    }

    /// Store a marker one second before the newest seen change, so records
    /// written in the same second as the marker are fetched again.
    fn set_sync_token(&self, table: Table, newest: DateTime<Utc>) -> UrusResult<()> {
        let Some(user) = self.current_user_id() else {
            return Ok(());
        };
        let mut tokens = self.sync_tokens();
        tokens
            .entry(user)
            .or_default()
            .insert(table, newest - TimeDelta::seconds(1));
        self.local.set_state(SYNC_TOKENS_KEY, &tokens)
    }

    pub fn clear_sync_tokens(&self, user_id: &str) -> UrusResult<()> {
        let mut tokens = self.sync_tokens();
        if tokens.remove(user_id).is_some() {
            self.local.set_state(SYNC_TOKENS_KEY, &tokens)?;
        }
        Ok(())
    }

    // CACHE:

    pub fn reset_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn list<T: Record>(&self) -> Vec<T> {
        self.cache.lock().list()
    }

    pub fn find<T: Record>(&self, id: &str) -> Option<T> {
        self.list::<T>().into_iter().find(|r| r.id() == id)
    }

    pub fn counts(&self) -> Counts {
        let mut cache = self.cache.lock();
        Counts(HashMap::from([
            (Table::Priorities, cache.list::<PriorityTask>().len()),
            (Table::Routines, cache.list::<RoutineItem>().len()),
            (Table::Notes, cache.list::<Note>().len()),
            (Table::Reflections, cache.list::<Reflection>().len()),
            (Table::Logs, cache.list::<ActivityLog>().len()),
            (Table::Habits, cache.list::<Habit>().len()),
            (Table::HabitLogs, cache.list::<HabitLog>().len()),
        ]))
    }

    /// Wipe locally persisted data (guest collections and the active
    /// provider's local copy) and every cache slot.
    pub async fn clear_all_data(&self) -> UrusResult<()> {
        self.provider().clear_all().await?;
        self.local.clear_tables()?;
        self.reset_cache();
        self.notify();
        Ok(())
    }

    // MUTATIONS:

    /// Insert or replace records in the cache and persist them.
    pub async fn save<T: Record>(&self, records: Vec<T>) -> UrusResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.cache.lock().upsert(&records);

        let values = encode_records(&records)?;
        self.provider().save(T::TABLE, values).await?;
        self.notify();
        Ok(())
    }

    pub async fn delete<T: Record>(&self, id: &str) -> UrusResult<()> {
        let removed: Option<T> = self.cache.lock().remove(id);
        if removed.is_none() {
            return Err(UrusError::Storage(format!("No {} record with id {}", T::TABLE, id)));
        }

        self.provider().delete(T::TABLE, id).await?;
        self.notify();
        Ok(())
    }

    pub async fn add_routine(
        &self,
        start_time: &str,
        end_time: &str,
        activity: &str,
        category: &str,
        description: Option<String>,
    ) -> UrusResult<RoutineItem> {
        parse_hhmm(start_time)?;
        parse_hhmm(end_time)?;

        let routine = RoutineItem {
            id: generate_id("routine"),
            start_time: start_time.trim().to_string(),
            end_time: end_time.trim().to_string(),
            activity: activity.to_string(),
            category: category.to_string(),
            completed_at: None,
            completion_note: None,
            description,
            updated_at: Some(Utc::now()),
            deleted_at: None,
            extra: Default::default(),
        };
        self.save(vec![routine.clone()]).await?;
        Ok(routine)
    }

    /// Flip a routine between done and not done.
    pub async fn toggle_routine(&self, id: &str, note: Option<String>) -> UrusResult<RoutineItem> {
        let mut routine = self
            .find::<RoutineItem>(id)
            .ok_or_else(|| UrusError::Storage(format!("No routine with id {id}")))?;

        let now = Utc::now();
        if routine.completed_at.is_some() {
            routine.completed_at = None;
            routine.completion_note = None;
        } else {
            routine.completed_at = Some(now);
            routine.completion_note = note;
        }
        routine.updated_at = Some(now);

        self.save(vec![routine.clone()]).await?;
        Ok(routine)
    }

    pub async fn add_priority(
        &self,
        text: &str,
        scheduled_for: Option<NaiveDate>,
    ) -> UrusResult<PriorityTask> {
        let priority = PriorityTask {
            id: generate_id("priority"),
            text: text.to_string(),
            completed: false,
            completion_note: None,
            scheduled_for,
            updated_at: Some(Utc::now()),
            deleted_at: None,
            extra: Default::default(),
        };
        self.save(vec![priority.clone()]).await?;
        Ok(priority)
    }

    pub async fn toggle_priority(&self, id: &str, note: Option<String>) -> UrusResult<PriorityTask> {
        let mut priority = self
            .find::<PriorityTask>(id)
            .ok_or_else(|| UrusError::Storage(format!("No priority with id {id}")))?;

        priority.completed = !priority.completed;
        priority.completion_note = if priority.completed { note } else { None };
        priority.updated_at = Some(Utc::now());

        self.save(vec![priority.clone()]).await?;
        Ok(priority)
    }
}

/// Decode raw records, skipping (and logging) any that don't fit the schema.
pub(crate) fn decode_records<T: Record>(table: Table, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Storage: skipping malformed {} record: {}", table, e);
                None
            }
        })
        .collect()
}

pub(crate) fn encode_records<T: Record>(records: &[T]) -> UrusResult<Vec<Value>> {
    records
        .iter()
        .map(|r| serde_json::to_value(r).map_err(UrusError::from))
        .collect()
}
