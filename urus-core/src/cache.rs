//! In-memory cache of every collection.
//!
//! A slot is `None` until its collection has been hydrated at least once, so
//! "not loaded yet" and "loaded, empty" stay distinguishable.

use std::collections::HashMap;

use crate::model::{
    ActivityLog, Habit, HabitLog, Note, PriorityTask, Record, Reflection, RoutineItem,
};

#[derive(Debug, Default)]
pub struct Cache {
    pub(crate) priorities: Option<Vec<PriorityTask>>,
    pub(crate) routines: Option<Vec<RoutineItem>>,
    pub(crate) notes: Option<Vec<Note>>,
    pub(crate) reflections: Option<Vec<Reflection>>,
    pub(crate) logs: Option<Vec<ActivityLog>>,
    pub(crate) habits: Option<Vec<Habit>>,
    pub(crate) habit_logs: Option<Vec<HabitLog>>,
}

impl Cache {
    pub fn clear(&mut self) {
        *self = Cache::default();
    }

    pub fn is_loaded<T: Record>(&mut self) -> bool {
        T::slot(self).is_some()
    }

    /// Live (not soft-deleted) records of a collection.
    pub fn list<T: Record>(&mut self) -> Vec<T> {
        T::slot(self)
            .as_ref()
            .map(|records| records.iter().filter(|r| !r.is_deleted()).cloned().collect())
            .unwrap_or_default()
    }

    /// Fold a freshly loaded batch into the slot.
    pub fn absorb<T: Record>(&mut self, incoming: Vec<T>) {
        let slot = T::slot(self);
        *slot = Some(match slot.take() {
            None => incoming.into_iter().filter(|r| !r.is_deleted()).collect(),
            Some(current) => merge_records(current, incoming),
        });
    }

    /// Insert or replace records by id.
    pub fn upsert<T: Record>(&mut self, records: &[T]) {
        let mut merged = T::slot(self).take().unwrap_or_default();
        for record in records {
            match merged.iter_mut().find(|r| r.id() == record.id()) {
                Some(existing) => *existing = record.clone(),
                None => merged.push(record.clone()),
            }
        }
        *T::slot(self) = Some(merged);
    }

    /// Returns the removed record, if any.
    pub fn remove<T: Record>(&mut self, id: &str) -> Option<T> {
        let records = T::slot(self).as_mut()?;
        let index = records.iter().position(|r| r.id() == id)?;
        Some(records.remove(index))
    }
}

/// Merge an incoming batch into the current records.
///
/// Soft-deleted incoming records remove their counterpart. Otherwise an
/// incoming record replaces the current one only when it is newer, or when
/// either side has no timestamp. Current order is kept; new records append.
pub fn merge_records<T: Record>(current: Vec<T>, incoming: Vec<T>) -> Vec<T> {
    let mut merged: Vec<Option<T>> = current.into_iter().map(Some).collect();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.as_ref().map(|r| (r.id().to_string(), i)))
        .collect();

    for item in incoming {
        let position = index.get(item.id()).copied();

        if item.is_deleted() {
            if let Some(i) = position {
                merged[i] = None;
                index.remove(item.id());
            }
            continue;
        }

        match position {
            Some(i) => {
                let existing = merged[i].as_ref().and_then(|r| r.updated_at());
                let replace = match (existing, item.updated_at()) {
                    (Some(existing), Some(incoming)) => incoming > existing,
                    _ => true,
                };
                if replace {
                    merged[i] = Some(item);
                }
            }
            None => {
                index.insert(item.id().to_string(), merged.len());
                merged.push(Some(item));
            }
        }
    }

    merged.into_iter().flatten().collect()
}
