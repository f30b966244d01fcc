//! Smart calendar sync.
//!
//! Pushes today's routines and priorities into the selected device calendar.
//! Each item's content hash is remembered next to the event it was written
//! to, so a rerun only touches items that changed since the last sync.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::backend::{CalendarBackend, NativeCalendar};
use crate::calendar::diff::{ItemDiff, SyncPlan};
use crate::calendar::item::collect_items;
use crate::calendar::mapping::{MappingEntry, SelectedCalendar, SyncMapping};
use crate::error::{UrusError, UrusResult};
use crate::model::{PriorityTask, RoutineItem};
use crate::storage::Storage;
use crate::time::today;

/// Serializes calendar writes across processes sharing a data dir.
const SYNC_LOCK: &str = "calendar_sync";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub success: bool,
    pub deleted: usize,
    pub errors: Vec<String>,
}

pub struct CalendarSync<'a> {
    storage: &'a Storage,
    backend: &'a dyn CalendarBackend,
}

impl<'a> CalendarSync<'a> {
    pub fn new(storage: &'a Storage, backend: &'a dyn CalendarBackend) -> Self {
        CalendarSync { storage, backend }
    }

    pub async fn smart_sync(&self) -> UrusResult<SyncResult> {
        self.smart_sync_on(today()).await
    }

    /// Bring the calendar in line with the items scheduled on `day`.
    ///
    /// Failures of individual event operations are collected in the result;
    /// everything that succeeded is recorded in the mapping.
    pub async fn smart_sync_on(&self, day: NaiveDate) -> UrusResult<SyncResult> {
        let store = self.storage.local();
        let _lock = store.try_lock(SYNC_LOCK)?;
        let mut mapping = SyncMapping::load(store)?;
        let mut result = SyncResult::default();

        let calendar = match self.ensure_calendar(&mut mapping).await {
            Ok(calendar) => calendar,
            Err(e) => {
                log::warn!("Calendar: no calendar to sync into: {}", e);
                result.errors.push(e.to_string());
                return Ok(result);
            }
        };

        mapping.roll_over(day);

        let routines = self.storage.list::<RoutineItem>();
        let priorities = self.storage.list::<PriorityTask>();
        let day_items = collect_items(day, &routines, &priorities);
        result.errors.extend(day_items.errors);

        let plan = SyncPlan::new(&day_items.items, &mapping.entries, &day_items.unrenderable);
        log::info!(
            "Calendar: syncing {} items into {} ({} changes)",
            day_items.items.len(),
            calendar.name,
            plan.len()
        );

        for diff in plan.diffs() {
            log::debug!("Calendar: {}", diff);
            match diff {
                ItemDiff::Create { item } => {
                    match self.backend.create_event(&calendar.id, &item.fields).await {
                        Ok(event_id) => {
                            mapping.entries.insert(
                                item.key.clone(),
                                MappingEntry {
                                    event_id,
                                    hash: item.hash.clone(),
                                },
                            );
                            result.created += 1;
                        }
                        Err(e) => result
                            .errors
                            .push(format!("Failed to create \"{}\": {}", item.label, e)),
                    }
                }
                ItemDiff::Update { item, event_id } => {
                    match self.backend.update_event(event_id, &item.fields).await {
                        Ok(()) => {
                            if let Some(entry) = mapping.entries.get_mut(&item.key) {
                                entry.hash = item.hash.clone();
                            }
                            result.updated += 1;
                        }
                        Err(e) => result
                            .errors
                            .push(format!("Failed to update \"{}\": {}", item.label, e)),
                    }
                }
                ItemDiff::Delete { key, event_id } => {
                    match self.backend.delete_event(event_id).await {
                        Ok(()) => {
                            mapping.entries.remove(key);
                            result.deleted += 1;
                        }
                        Err(e) => result
                            .errors
                            .push(format!("Failed to delete {}: {}", key, e)),
                    }
                }
            }
        }

        if let Err(e) = mapping.save(store) {
            log::error!("Calendar: could not save the sync mapping: {}", e);
            result.errors.push(format!("Failed to save sync state: {e}"));
        }
        result.success = result.errors.is_empty();
        Ok(result)
    }

    /// Delete every event written by the last sync and forget the mapping.
    pub async fn clear_today_calendar_events(&self) -> UrusResult<ClearResult> {
        let store = self.storage.local();
        let _lock = store.try_lock(SYNC_LOCK)?;
        let mut mapping = SyncMapping::load(store)?;
        let mut result = ClearResult::default();

        for (key, entry) in &mapping.entries {
            match self.backend.delete_event(&entry.event_id).await {
                Ok(()) => result.deleted += 1,
                Err(e) => result
                    .errors
                    .push(format!("Failed to delete {}: {}", key, e)),
            }
        }

        mapping.entries.clear();
        if let Err(e) = mapping.save(store) {
            log::error!("Calendar: could not save the sync mapping: {}", e);
            result.errors.push(format!("Failed to save sync state: {e}"));
        }
        result.success = result.errors.is_empty();
        Ok(result)
    }

    pub fn selected_calendar(&self) -> UrusResult<Option<SelectedCalendar>> {
        Ok(SyncMapping::load(self.storage.local())?.selected_calendar)
    }

    pub async fn list_calendars(&self) -> UrusResult<Vec<NativeCalendar>> {
        self.backend.list_calendars().await
    }

    /// Choose the calendar future syncs write to.
    pub async fn select_calendar(&self, id: &str) -> UrusResult<SelectedCalendar> {
        let calendar = self
            .backend
            .list_calendars()
            .await?
            .into_iter()
            .find(|c| c.id == id && c.writable)
            .ok_or_else(|| UrusError::CalendarNotFound(id.to_string()))?;

        let store = self.storage.local();
        let _lock = store.try_lock(SYNC_LOCK)?;
        let mut mapping = SyncMapping::load(store)?;
        let selected = SelectedCalendar {
            id: calendar.id,
            name: calendar.title,
        };
        mapping.selected_calendar = Some(selected.clone());
        mapping.save(store)?;
        Ok(selected)
    }

    async fn ensure_calendar(&self, mapping: &mut SyncMapping) -> UrusResult<SelectedCalendar> {
        if let Some(selected) = &mapping.selected_calendar {
            return Ok(selected.clone());
        }

        let calendars = self.backend.list_calendars().await?;
        let chosen = auto_select(&calendars).ok_or(UrusError::NoCalendars)?;
        let selected = SelectedCalendar {
            id: chosen.id.clone(),
            name: chosen.title.clone(),
        };
        log::info!("Calendar: selected \"{}\"", selected.name);

        mapping.selected_calendar = Some(selected.clone());
        mapping.save(self.storage.local())?;
        Ok(selected)
    }
}

/// Prefer a writable calendar that looks like the user's main one.
pub fn auto_select(calendars: &[NativeCalendar]) -> Option<&NativeCalendar> {
    let writable: Vec<&NativeCalendar> = calendars.iter().filter(|c| c.writable).collect();

    writable
        .iter()
        .find(|c| {
            let title = c.title.to_lowercase();
            !title.contains("birthday")
                && !title.contains("holiday")
                && (title.contains("calendar") || title.contains('@'))
        })
        .or_else(|| writable.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalProvider, LocalStore};
    use crate::testing::FakeCalendar;
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    fn calendar(id: &str, title: &str, writable: bool) -> NativeCalendar {
        NativeCalendar {
            id: id.into(),
            title: title.into(),
            writable,
        }
    }

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::open(dir.path()).unwrap();
        let storage = Storage::new(local.clone(), Arc::new(LocalProvider::new(local)));
        storage.hydrate_cache(false).await.unwrap();
        (dir, storage)
    }

    fn backend() -> FakeCalendar {
        FakeCalendar::with_calendars(vec![calendar("cal-1", "Calendar", true)])
    }

    #[tokio::test]
    async fn test_rerun_creates_no_duplicates() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        storage
            .add_routine("07:00", "08:00", "Run", "Fitness", None)
            .await
            .unwrap();
        storage.add_priority("Ship", Some(day())).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        let first = sync.smart_sync_on(day()).await.unwrap();
        assert_eq!((first.created, first.updated, first.deleted), (2, 0, 0));
        assert!(first.success);

        let second = sync.smart_sync_on(day()).await.unwrap();
        assert_eq!((second.created, second.updated, second.deleted), (0, 0, 0));
        assert!(second.success);
        assert_eq!(backend.events().len(), 2);
    }

    #[tokio::test]
    async fn test_changed_item_updates_event() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        let mut routine = storage
            .add_routine("07:00", "08:00", "Run", "Fitness", None)
            .await
            .unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();

        routine.activity = "Swim".into();
        storage.save(vec![routine]).await.unwrap();

        let result = sync.smart_sync_on(day()).await.unwrap();
        assert_eq!((result.created, result.updated), (0, 1));

        let events = backend.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields.title, "📋 Swim");
    }

    #[tokio::test]
    async fn test_removed_item_deletes_event() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        let routine = storage
            .add_routine("07:00", "08:00", "Run", "Fitness", None)
            .await
            .unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();

        storage.delete::<RoutineItem>(&routine.id).await.unwrap();
        let result = sync.smart_sync_on(day()).await.unwrap();

        assert_eq!(result.deleted, 1);
        assert!(backend.events().is_empty());
        let mapping = SyncMapping::load(storage.local()).unwrap();
        assert!(mapping.entries.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        backend.fail_on_title("⭐ Broken");
        storage.add_priority("One", None).await.unwrap();
        storage.add_priority("Broken", None).await.unwrap();
        storage.add_priority("Two", None).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        let result = sync.smart_sync_on(day()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.created, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Broken"));
        assert_eq!(SyncMapping::load(storage.local()).unwrap().entries.len(), 2);

        backend.clear_failures();
        let retry = sync.smart_sync_on(day()).await.unwrap();
        assert!(retry.success);
        assert_eq!(retry.created, 1);
        assert_eq!(backend.events().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_delete_stays_mapped() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        let priority = storage.add_priority("Ship", None).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();
        let event_id = backend.events()[0].id.clone();

        backend.fail_on_event(&event_id);
        storage.delete::<PriorityTask>(&priority.id).await.unwrap();
        let result = sync.smart_sync_on(day()).await.unwrap();
        assert_eq!(result.deleted, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(SyncMapping::load(storage.local()).unwrap().entries.len(), 1);

        backend.clear_failures();
        let retry = sync.smart_sync_on(day()).await.unwrap();
        assert_eq!(retry.deleted, 1);
    }

    #[tokio::test]
    async fn test_new_day_forgets_previous_mapping() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        storage
            .add_routine("07:00", "08:00", "Run", "Fitness", None)
            .await
            .unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();

        let next = day().succ_opt().unwrap();
        let result = sync.smart_sync_on(next).await.unwrap();
        assert_eq!((result.created, result.deleted), (1, 0));
        assert_eq!(backend.events().len(), 2);

        let mapping = SyncMapping::load(storage.local()).unwrap();
        assert_eq!(mapping.last_sync_date, Some(next));
    }

    #[tokio::test]
    async fn test_clear_today_removes_mapped_events() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        storage.add_priority("One", None).await.unwrap();
        storage.add_priority("Two", None).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();

        let cleared = sync.clear_today_calendar_events().await.unwrap();
        assert_eq!(
            cleared,
            ClearResult {
                success: true,
                deleted: 2,
                errors: vec![]
            }
        );
        assert!(backend.events().is_empty());
        assert!(SyncMapping::load(storage.local()).unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_no_writable_calendar_is_one_error() {
        let (_dir, storage) = storage().await;
        let backend = FakeCalendar::with_calendars(vec![calendar("ro", "Calendar", false)]);
        storage.add_priority("One", None).await.unwrap();

        let result = CalendarSync::new(&storage, &backend)
            .smart_sync_on(day())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.created, 0);
        assert_eq!(backend.event_calls(), 0);
    }

    #[tokio::test]
    async fn test_unsaved_mapping_still_reports_counts() {
        let (dir, storage) = storage().await;
        let backend = backend();
        storage.add_priority("Ship", None).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.select_calendar("cal-1").await.unwrap();
        // A directory where the temp file would go makes the save fail.
        std::fs::create_dir(dir.path().join("state").join("calendar_sync.json.tmp")).unwrap();

        let result = sync.smart_sync_on(day()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.created, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("save sync state"));
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_refused() {
        let (_dir, storage) = storage().await;
        let backend = backend();
        storage.add_priority("Ship", None).await.unwrap();

        let held = storage.local().try_lock(SYNC_LOCK).unwrap();
        let sync = CalendarSync::new(&storage, &backend);
        assert!(matches!(
            sync.smart_sync_on(day()).await,
            Err(UrusError::Locked(_))
        ));
        assert_eq!(backend.event_calls(), 0);

        drop(held);
        assert_eq!(sync.smart_sync_on(day()).await.unwrap().created, 1);
    }

    #[tokio::test]
    async fn test_selection_is_persisted_and_manual_override_wins() {
        let (_dir, storage) = storage().await;
        let backend = FakeCalendar::with_calendars(vec![
            calendar("bday", "Birthdays", true),
            calendar("work", "Work", true),
            calendar("home", "Home Calendar", true),
        ]);
        storage.add_priority("One", None).await.unwrap();

        let sync = CalendarSync::new(&storage, &backend);
        sync.smart_sync_on(day()).await.unwrap();
        assert_eq!(sync.selected_calendar().unwrap().unwrap().id, "home");
        assert_eq!(backend.events()[0].calendar_id, "home");

        let selected = sync.select_calendar("work").await.unwrap();
        assert_eq!(selected.name, "Work");
        assert!(matches!(
            sync.select_calendar("missing").await,
            Err(UrusError::CalendarNotFound(_))
        ));
        assert_eq!(sync.selected_calendar().unwrap().unwrap().id, "work");
    }

    #[test]
    fn test_auto_select_rules() {
        let calendars = vec![
            calendar("ro", "Calendar", false),
            calendar("hol", "US Holidays calendar", true),
            calendar("me", "me@example.com", true),
        ];
        assert_eq!(auto_select(&calendars).unwrap().id, "me");

        let plain = vec![calendar("a", "Work", true), calendar("b", "Family", true)];
        assert_eq!(auto_select(&plain).unwrap().id, "a");

        assert!(auto_select(&[calendar("ro", "Calendar", false)]).is_none());
    }
}
