//! Schedule items that become calendar events.

use std::fmt;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::calendar::backend::EventFields;
use crate::error::UrusResult;
use crate::model::{PriorityTask, RoutineItem};
use crate::time::time_range_on;

/// Mapping key of a schedule item: `routine:<id>` or `priority:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn routine(id: &str) -> Self {
        ItemKey(format!("routine:{id}"))
    }

    pub fn priority(id: &str) -> Self {
        ItemKey(format!("priority:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A schedule item rendered as the event it should appear as.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub key: ItemKey,
    /// Human name used in error messages.
    pub label: String,
    pub fields: EventFields,
    pub hash: String,
}

/// Everything scheduled on one day.
#[derive(Debug, Default)]
pub struct DayItems {
    pub items: Vec<SyncItem>,
    /// Items that exist but couldn't be rendered. Their mapped events are left alone.
    pub unrenderable: Vec<ItemKey>,
    pub errors: Vec<String>,
}

/// Collect every routine plus the priorities that apply to `day`.
pub fn collect_items(
    day: NaiveDate,
    routines: &[RoutineItem],
    priorities: &[PriorityTask],
) -> DayItems {
    let mut out = DayItems::default();

    for routine in routines.iter().filter(|r| r.deleted_at.is_none()) {
        match routine_item(day, routine) {
            Ok(item) => out.items.push(item),
            Err(e) => {
                out.unrenderable.push(ItemKey::routine(&routine.id));
                out.errors.push(format!("Routine \"{}\": {}", routine.activity, e));
            }
        }
    }

    out.items.extend(
        priorities
            .iter()
            .filter(|p| p.deleted_at.is_none() && p.is_for(day))
            .map(|p| priority_item(day, p)),
    );

    out
}

fn routine_item(day: NaiveDate, routine: &RoutineItem) -> UrusResult<SyncItem> {
    let (start, end) = time_range_on(day, &routine.start_time, &routine.end_time)?;
    let description = routine
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Category: {}", routine.category));

    Ok(SyncItem {
        key: ItemKey::routine(&routine.id),
        label: routine.activity.clone(),
        fields: EventFields {
            title: format!("📋 {}", routine.activity),
            start,
            end,
            all_day: false,
            description,
        },
        hash: routine_hash(routine),
    })
}

fn priority_item(day: NaiveDate, priority: &PriorityTask) -> SyncItem {
    let start = day.and_time(chrono::NaiveTime::MIN);
    let icon = if priority.completed { "✅" } else { "⭐" };
    let description = priority
        .completion_note
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Today's priority".to_string());

    SyncItem {
        key: ItemKey::priority(&priority.id),
        label: priority.text.clone(),
        fields: EventFields {
            title: format!("{} {}", icon, priority.text),
            start,
            end: start + TimeDelta::days(1),
            all_day: true,
            description,
        },
        hash: priority_hash(priority),
    }
}

pub fn routine_hash(routine: &RoutineItem) -> String {
    content_hash(&[
        &routine.activity,
        &routine.start_time,
        &routine.end_time,
        &routine.category,
        routine.description.as_deref().unwrap_or_default(),
    ])
}

pub fn priority_hash(priority: &PriorityTask) -> String {
    let scheduled = priority
        .scheduled_for
        .map(|d| d.to_string())
        .unwrap_or_default();
    content_hash(&[
        &priority.text,
        if priority.completed { "true" } else { "false" },
        &scheduled,
        priority.completion_note.as_deref().unwrap_or_default(),
    ])
}

fn content_hash(parts: &[&str]) -> String {
    hex::encode(Sha256::digest(parts.join("|").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    fn routine(id: &str, start: &str, end: &str) -> RoutineItem {
        RoutineItem {
            id: id.into(),
            start_time: start.into(),
            end_time: end.into(),
            activity: "Run".into(),
            category: "Fitness".into(),
            completed_at: None,
            completion_note: None,
            description: None,
            updated_at: None,
            deleted_at: None,
            extra: Default::default(),
        }
    }

    fn priority(id: &str, scheduled_for: Option<NaiveDate>) -> PriorityTask {
        PriorityTask {
            id: id.into(),
            text: "Ship".into(),
            completed: false,
            completion_note: None,
            scheduled_for,
            updated_at: None,
            deleted_at: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_routine_event_fields() {
        let items = collect_items(day(), &[routine("r1", "22:00", "06:00")], &[]);
        let item = &items.items[0];

        assert_eq!(item.key.as_str(), "routine:r1");
        assert_eq!(item.fields.title, "📋 Run");
        assert_eq!(item.fields.description, "Category: Fitness");
        assert_eq!(item.fields.start, day().and_hms_opt(22, 0, 0).unwrap());
        assert_eq!(item.fields.end, day().succ_opt().unwrap().and_hms_opt(6, 0, 0).unwrap());
    }

    #[test]
    fn test_priorities_filtered_by_day() {
        let tomorrow = day().succ_opt().unwrap();
        let mut done = priority("p3", None);
        done.completed = true;

        let items = collect_items(
            day(),
            &[],
            &[priority("p1", Some(day())), priority("p2", Some(tomorrow)), done],
        );
        let keys: Vec<_> = items.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["priority:p1", "priority:p3"]);

        assert!(items.items[0].fields.all_day);
        assert_eq!(items.items[0].fields.title, "⭐ Ship");
        assert_eq!(items.items[0].fields.description, "Today's priority");
        assert_eq!(items.items[1].fields.title, "✅ Ship");
    }

    #[test]
    fn test_unrenderable_routine_is_reported() {
        let items = collect_items(day(), &[routine("r1", "7am", "08:00")], &[]);
        assert!(items.items.is_empty());
        assert_eq!(items.unrenderable, vec![ItemKey::routine("r1")]);
        assert_eq!(items.errors.len(), 1);
    }

    #[test]
    fn test_hash_tracks_content() {
        let base = routine("r1", "07:00", "08:00");
        let mut renamed = base.clone();
        renamed.activity = "Swim".into();
        let mut completed = base.clone();
        completed.completed_at = Some(chrono::Utc::now());

        assert_ne!(routine_hash(&base), routine_hash(&renamed));
        assert_eq!(routine_hash(&base), routine_hash(&completed));

        let p = priority("p1", None);
        let mut toggled = p.clone();
        toggled.completed = true;
        assert_ne!(priority_hash(&p), priority_hash(&toggled));
    }
}
