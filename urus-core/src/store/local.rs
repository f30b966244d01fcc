//! Local persistent store.
//!
//! Each collection is a JSON array in `<root>/<table>.json`. Small pieces of
//! bookkeeping (sync tokens, the calendar mapping, the offline queue, saved
//! credentials) live as JSON documents under `<root>/state/`. Every write goes
//! through a temp file and a rename so a crash never leaves a torn file.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{UrusError, UrusResult};
use crate::model::Table;

const STATE_DIR: &str = "state";
const USERS_DIR: &str = "users";

/// Held lock from `LocalStore::try_lock`.
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> UrusResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STATE_DIR)).map_err(|e| {
            UrusError::Storage(format!("Could not open local store at {}: {e}", root.display()))
        })?;
        Ok(LocalStore { root })
    }

    /// The store holding one account's cloud mirror, under `<root>/users/<id>`.
    /// Kept apart from the guest collections at the root.
    pub fn user_store(&self, user_id: &str) -> UrusResult<LocalStore> {
        let dir: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        LocalStore::open(self.root.join(USERS_DIR).join(dir))
    }

    fn table_path(&self, table: Table) -> PathBuf {
        self.root.join(format!("{}.json", table.name()))
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.root.join(STATE_DIR).join(format!("{key}.json"))
    }

    // TABLES:

    pub fn read_table(&self, table: Table) -> UrusResult<Vec<Value>> {
        read_json(&self.table_path(table)).map(Option::unwrap_or_default)
    }

    pub fn write_table(&self, table: Table, records: &[Value]) -> UrusResult<()> {
        write_json(&self.table_path(table), &records)
    }

    /// Insert or replace records by their `id` field, keeping existing order.
    pub fn upsert(&self, table: Table, records: &[Value]) -> UrusResult<()> {
        let mut current = self.read_table(table)?;

        for record in records {
            let id = record_id(record).ok_or_else(|| {
                UrusError::Storage(format!("Record in {table} is missing an id"))
            })?;
            match current.iter_mut().find(|r| record_id(r) == Some(id)) {
                Some(existing) => *existing = record.clone(),
                None => current.push(record.clone()),
            }
        }

        self.write_table(table, &current)
    }

    pub fn delete(&self, table: Table, id: &str) -> UrusResult<()> {
        let mut current = self.read_table(table)?;
        let before = current.len();
        current.retain(|r| record_id(r) != Some(id));

        if current.len() != before {
            self.write_table(table, &current)?;
        }
        Ok(())
    }

    /// Remove every collection file. State documents are kept.
    pub fn clear_tables(&self) -> UrusResult<()> {
        for table in Table::ALL {
            let path = self.table_path(table);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    // STATE:

    /// Take the exclusive lock `<root>/state/<name>.lock`, failing if another
    /// holder has it. Released when the guard drops.
    pub fn try_lock(&self, name: &str) -> UrusResult<StoreLock> {
        let path = self.root.join(STATE_DIR).join(format!("{name}.lock"));
        let file = File::create(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| UrusError::Locked(name.to_string()))?;
        Ok(StoreLock { _file: file })
    }

    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> UrusResult<Option<T>> {
        read_json(&self.state_path(key))
    }

    pub fn set_state<T: Serialize>(&self, key: &str, value: &T) -> UrusResult<()> {
        write_json(&self.state_path(key), value)
    }

    pub fn remove_state(&self, key: &str) -> UrusResult<()> {
        let path = self.state_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> UrusResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&content)
        .map_err(|e| UrusError::Storage(format!("Corrupt file {}: {e}", path.display())))?;
    Ok(Some(value))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> UrusResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    let temp = path.with_extension("json.tmp");

    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_missing_table_is_empty() {
        let (_dir, store) = store();
        assert!(store.read_table(Table::Notes).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let (_dir, store) = store();
        store
            .upsert(
                Table::Priorities,
                &[json!({"id": "a", "text": "one"}), json!({"id": "b", "text": "two"})],
            )
            .unwrap();
        store
            .upsert(Table::Priorities, &[json!({"id": "a", "text": "uno"})])
            .unwrap();

        let records = store.read_table(Table::Priorities).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["text"], "uno");
        assert_eq!(records[1]["id"], "b");
    }

    #[test]
    fn test_upsert_rejects_records_without_id() {
        let (_dir, store) = store();
        let err = store.upsert(Table::Logs, &[json!({"content": "x"})]);
        assert!(matches!(err, Err(UrusError::Storage(_))));
    }

    #[test]
    fn test_delete_and_clear() {
        let (_dir, store) = store();
        store
            .upsert(Table::Routines, &[json!({"id": "r1"}), json!({"id": "r2"})])
            .unwrap();
        store.delete(Table::Routines, "r1").unwrap();
        assert_eq!(store.read_table(Table::Routines).unwrap().len(), 1);

        store.set_state("session", &json!({"token": "t"})).unwrap();
        store.clear_tables().unwrap();
        assert!(store.read_table(Table::Routines).unwrap().is_empty());

        let session: Option<Value> = store.get_state("session").unwrap();
        assert!(session.is_some());
    }

    #[test]
    fn test_user_store_is_separate() {
        let (_dir, store) = store();
        store.upsert(Table::Notes, &[json!({"id": "guest"})]).unwrap();

        let mirror = store.user_store("user@example.com").unwrap();
        assert!(mirror.read_table(Table::Notes).unwrap().is_empty());
        mirror.upsert(Table::Notes, &[json!({"id": "account"})]).unwrap();

        store.clear_tables().unwrap();
        assert_eq!(mirror.read_table(Table::Notes).unwrap().len(), 1);
        assert_eq!(
            store.user_store("user@example.com").unwrap().read_table(Table::Notes).unwrap()[0]["id"],
            "account"
        );
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let (_dir, store) = store();
        let held = store.try_lock("calendar_sync").unwrap();
        assert!(matches!(
            store.try_lock("calendar_sync"),
            Err(UrusError::Locked(_))
        ));
        drop(held);
        assert!(store.try_lock("calendar_sync").is_ok());
    }

    #[test]
    fn test_state_round_trip_and_remove() {
        let (_dir, store) = store();
        assert_eq!(store.get_state::<u32>("counter").unwrap(), None);

        store.set_state("counter", &7u32).unwrap();
        assert_eq!(store.get_state::<u32>("counter").unwrap(), Some(7));

        store.remove_state("counter").unwrap();
        assert_eq!(store.get_state::<u32>("counter").unwrap(), None);
    }
}
