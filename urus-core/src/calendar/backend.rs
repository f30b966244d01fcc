//! Device calendar access.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::UrusResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCalendar {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub writable: bool,
}

/// The fields urus writes to a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
    pub description: String,
}

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn check_permission(&self) -> UrusResult<bool>;

    /// May prompt the user, so implementations should allow it to take a while.
    async fn request_permission(&self) -> UrusResult<bool>;

    async fn list_calendars(&self) -> UrusResult<Vec<NativeCalendar>>;

    /// Returns the id the calendar assigned to the new event.
    async fn create_event(&self, calendar_id: &str, fields: &EventFields) -> UrusResult<String>;

    async fn update_event(&self, event_id: &str, fields: &EventFields) -> UrusResult<()>;

    async fn delete_event(&self, event_id: &str) -> UrusResult<()>;
}
