//! User-owned records.
//!
//! Every collection shares the sync bookkeeping fields (`id`, `updated_at`,
//! `deleted_at`) which the storage layer uses for incremental hydration and
//! soft deletes. Records serialize in camelCase to stay compatible with the
//! existing local and cloud data.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::cache::Cache;

/// A persisted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Priorities,
    Routines,
    Notes,
    Reflections,
    Logs,
    Habits,
    HabitLogs,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Priorities,
        Table::Routines,
        Table::Notes,
        Table::Reflections,
        Table::Logs,
        Table::Habits,
        Table::HabitLogs,
    ];

    /// Stable name used for file names and sync token keys.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Priorities => "priorities",
            Table::Routines => "routines",
            Table::Notes => "notes",
            Table::Reflections => "reflections",
            Table::Logs => "logs",
            Table::Habits => "habits",
            Table::HabitLogs => "habit_logs",
        }
    }

    /// Path segment of the cloud REST endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Table::HabitLogs => "habit-logs",
            other => other.name(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A record that lives in one of the synced collections.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> &str;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// The cache slot holding this collection.
    fn slot(cache: &mut Cache) -> &mut Option<Vec<Self>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

macro_rules! impl_record {
    ($ty:ty, $table:expr, $field:ident) => {
        impl Record for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn updated_at(&self) -> Option<DateTime<Utc>> {
                self.updated_at
            }

            fn deleted_at(&self) -> Option<DateTime<Utc>> {
                self.deleted_at
            }

            fn slot(cache: &mut Cache) -> &mut Option<Vec<Self>> {
                &mut cache.$field
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityTask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_note: Option<String>,
    /// Day this priority belongs to. `None` means it recurs every day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Fields this version doesn't model, carried through so rewriting a
    /// record never drops them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriorityTask {
    pub fn is_for(&self, day: NaiveDate) -> bool {
        self.scheduled_for.is_none_or(|d| d == day)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineItem {
    pub id: String,
    /// "HH:MM", 24h
    pub start_time: String,
    /// "HH:MM", 24h
    pub end_time: String,
    pub activity: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub id: String,
    pub date: String,
    pub win_of_day: String,
    pub hurdle: String,
    /// Plan for tomorrow.
    #[serde(default)]
    pub priorities: Vec<String>,
    pub small_change: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Text,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_allowed_day_off() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: String,
    #[serde(default = "default_allowed_day_off")]
    pub allowed_day_off: u32,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitLog {
    pub id: String,
    pub habit_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_record!(PriorityTask, Table::Priorities, priorities);
impl_record!(RoutineItem, Table::Routines, routines);
impl_record!(Note, Table::Notes, notes);
impl_record!(Reflection, Table::Reflections, reflections);
impl_record!(ActivityLog, Table::Logs, logs);
impl_record!(Habit, Table::Habits, habits);
impl_record!(HabitLog, Table::HabitLogs, habit_logs);

/// Generate a record id of the form `<prefix>-<millis>-<random>`.
pub fn generate_id(prefix: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), &random[..9])
}
