//! In-memory fakes for the remote store and the device calendar.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::calendar::{CalendarBackend, EventFields, NativeCalendar};
use crate::error::{UrusError, UrusResult};
use crate::model::Table;
use crate::store::RemoteStore;

#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    offline: AtomicBool,
    fetches: Mutex<HashMap<Table, usize>>,
    last_since: Mutex<HashMap<Table, Option<DateTime<Utc>>>>,
}

impl MemoryRemote {
    /// Insert or replace a record by id.
    pub fn insert(&self, table: Table, record: Value) {
        let mut tables = self.tables.lock();
        let records = tables.entry(table).or_default();
        match records.iter_mut().find(|r| r["id"] == record["id"]) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn records(&self, table: Table) -> Vec<Value> {
        self.tables.lock().get(&table).cloned().unwrap_or_default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, table: Table) -> usize {
        self.fetches.lock().get(&table).copied().unwrap_or(0)
    }

    pub fn last_since(&self, table: Table) -> Option<DateTime<Utc>> {
        self.last_since.lock().get(&table).copied().flatten()
    }

    fn check_online(&self) -> UrusResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(UrusError::Cloud("offline".into()));
        }
        Ok(())
    }
}

fn updated_at(record: &Value) -> Option<DateTime<Utc>> {
    record["updatedAt"].as_str()?.parse().ok()
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self, table: Table, since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>> {
        // Let concurrent callers interleave like a real request would.
        tokio::task::yield_now().await;
        self.check_online()?;

        *self.fetches.lock().entry(table).or_default() += 1;
        self.last_since.lock().insert(table, since);

        Ok(self
            .records(table)
            .into_iter()
            .filter(|r| match (since, updated_at(r)) {
                (Some(since), Some(updated)) => updated > since,
                _ => true,
            })
            .collect())
    }

    async fn upsert(&self, table: Table, records: &[Value]) -> UrusResult<()> {
        self.check_online()?;
        for record in records {
            self.insert(table, record.clone());
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> UrusResult<()> {
        self.check_online()?;
        if let Some(records) = self.tables.lock().get_mut(&table) {
            records.retain(|r| r["id"] != id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeEvent {
    pub id: String,
    pub calendar_id: String,
    pub fields: EventFields,
}

/// A device calendar that keeps events in memory and can be told to fail.
#[derive(Default)]
pub struct FakeCalendar {
    calendars: Vec<NativeCalendar>,
    events: Mutex<Vec<FakeEvent>>,
    failing_titles: Mutex<HashSet<String>>,
    failing_events: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    event_calls: AtomicU64,
    granted: AtomicBool,
}

impl FakeCalendar {
    pub fn with_calendars(calendars: Vec<NativeCalendar>) -> Self {
        FakeCalendar {
            calendars,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.events.lock().clone()
    }

    /// Event create/update/delete calls made so far, failed ones included.
    pub fn event_calls(&self) -> u64 {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn fail_on_title(&self, title: &str) {
        self.failing_titles.lock().insert(title.to_string());
    }

    pub fn fail_on_event(&self, event_id: &str) {
        self.failing_events.lock().insert(event_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_titles.lock().clear();
        self.failing_events.lock().clear();
    }

    fn check(&self, event_id: Option<&str>, fields: Option<&EventFields>) -> UrusResult<()> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        let title_fails = fields.is_some_and(|f| self.failing_titles.lock().contains(&f.title));
        let event_fails = event_id.is_some_and(|id| self.failing_events.lock().contains(id));
        if title_fails || event_fails {
            return Err(UrusError::Calendar("rejected by calendar".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarBackend for FakeCalendar {
    async fn check_permission(&self) -> UrusResult<bool> {
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn request_permission(&self) -> UrusResult<bool> {
        self.granted.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn list_calendars(&self) -> UrusResult<Vec<NativeCalendar>> {
        Ok(self.calendars.clone())
    }

    async fn create_event(&self, calendar_id: &str, fields: &EventFields) -> UrusResult<String> {
        self.check(None, Some(fields))?;
        let id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().push(FakeEvent {
            id: id.clone(),
            calendar_id: calendar_id.to_string(),
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn update_event(&self, event_id: &str, fields: &EventFields) -> UrusResult<()> {
        self.check(Some(event_id), Some(fields))?;
        let mut events = self.events.lock();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| UrusError::Calendar(format!("No event {event_id}")))?;
        event.fields = fields.clone();
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> UrusResult<()> {
        self.check(Some(event_id), None)?;
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            return Err(UrusError::Calendar(format!("No event {event_id}")));
        }
        Ok(())
    }
}
