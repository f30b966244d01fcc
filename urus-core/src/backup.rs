//! JSON backup export and import.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{UrusError, UrusResult};
use crate::model::{
    ActivityLog, Habit, HabitLog, Note, PriorityTask, Record, Reflection, RoutineItem,
};
use crate::storage::{Storage, decode_records, encode_records};

const BACKUP_VERSION: u32 = 1;

/// A full copy of the user's data. Collections missing from an imported file
/// are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priorities: Option<Vec<PriorityTask>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflections: Option<Vec<Reflection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routines: Option<Vec<RoutineItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<ActivityLog>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habits: Option<Vec<Habit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habit_logs: Option<Vec<HabitLog>>,
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BackupDocument {
    pub fn record_count(&self) -> usize {
        fn len<T>(records: &Option<Vec<T>>) -> usize {
            records.as_ref().map_or(0, Vec::len)
        }
        len(&self.priorities)
            + len(&self.reflections)
            + len(&self.notes)
            + len(&self.routines)
            + len(&self.logs)
            + len(&self.habits)
            + len(&self.habit_logs)
    }
}

/// `urus-diri-backup-<date>.json`
pub fn default_file_name(day: NaiveDate) -> String {
    format!("urus-diri-backup-{}.json", day.format("%Y-%m-%d"))
}

/// Snapshot every live record from the active provider.
pub async fn export_data(storage: &Storage) -> UrusResult<BackupDocument> {
    Ok(BackupDocument {
        priorities: Some(export_table(storage).await?),
        reflections: Some(export_table(storage).await?),
        notes: Some(export_table(storage).await?),
        routines: Some(export_table(storage).await?),
        logs: Some(export_table(storage).await?),
        habits: Some(export_table(storage).await?),
        habit_logs: Some(export_table(storage).await?),
        version: BACKUP_VERSION,
        timestamp: Some(Utc::now()),
    })
}

async fn export_table<T: Record>(storage: &Storage) -> UrusResult<Vec<T>> {
    let raw = storage.provider().load(T::TABLE, None).await?;
    Ok(decode_records::<T>(T::TABLE, raw)
        .into_iter()
        .filter(|r| !r.is_deleted())
        .collect())
}

pub async fn export_to_file(storage: &Storage, path: &Path) -> UrusResult<BackupDocument> {
    let document = export_data(storage).await?;
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
    log::info!(
        "Backup: wrote {} records to {}",
        document.record_count(),
        path.display()
    );
    Ok(document)
}

/// Restore a backup. Returns the number of records written.
pub async fn import_data(storage: &Storage, json: &str) -> UrusResult<usize> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| UrusError::InvalidBackup(e.to_string()))?;
    if !value.is_object() {
        return Err(UrusError::InvalidBackup("expected a JSON object".into()));
    }
    let document: BackupDocument =
        serde_json::from_value(value).map_err(|e| UrusError::InvalidBackup(e.to_string()))?;

    let restored = restore(storage, document.priorities).await?
        + restore(storage, document.reflections).await?
        + restore(storage, document.notes).await?
        + restore(storage, document.routines).await?
        + restore(storage, document.logs).await?
        + restore(storage, document.habits).await?
        + restore(storage, document.habit_logs).await?;

    storage.hydrate_cache(true).await?;
    log::info!("Backup: restored {} records", restored);
    Ok(restored)
}

async fn restore<T: Record>(storage: &Storage, records: Option<Vec<T>>) -> UrusResult<usize> {
    let Some(records) = records.filter(|r| !r.is_empty()) else {
        return Ok(0);
    };
    storage
        .provider()
        .save(T::TABLE, encode_records(&records)?)
        .await?;
    Ok(records.len())
}

pub async fn import_file(storage: &Storage, path: &Path) -> UrusResult<usize> {
    let json = std::fs::read_to_string(path)?;
    import_data(storage, &json).await
}
