//! Persisted item-to-event mapping.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::item::ItemKey;
use crate::error::UrusResult;
use crate::store::LocalStore;

const MAPPING_KEY: &str = "calendar_sync";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub event_id: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCalendar {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMapping {
    #[serde(default)]
    pub entries: BTreeMap<ItemKey, MappingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_calendar: Option<SelectedCalendar>,
}

impl SyncMapping {
    pub fn load(store: &LocalStore) -> UrusResult<Self> {
        Ok(store.get_state(MAPPING_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &LocalStore) -> UrusResult<()> {
        store.set_state(MAPPING_KEY, self)
    }

    /// Drop entries recorded on another day. Their events stay where they are.
    /// Returns whether anything was dropped.
    pub fn roll_over(&mut self, day: NaiveDate) -> bool {
        if self.last_sync_date == Some(day) {
            return false;
        }
        let dropped = !self.entries.is_empty();
        if dropped {
            log::info!(
                "Calendar: new day, forgetting {} mapped events from {:?}",
                self.entries.len(),
                self.last_sync_date
            );
        }
        self.entries.clear();
        self.last_sync_date = Some(day);
        dropped
    }
}
