//! Guest data found at sign-in.
//!
//! Guest collections live at the root of the local store and are never mixed
//! into an account's mirror. When a guest signs in, their records are shown
//! alongside the account's until the user decides: keep them (move them into
//! the account) or discard them (wipe local data and reload from the cloud).
//!
//! The pending decision is persisted, so it survives a restart.

use serde::{Deserialize, Serialize};

use crate::auth_sync::AuthSyncManager;
use crate::error::UrusResult;
use crate::model::Table;
use crate::storage::Storage;
use crate::store::LocalStore;

const PENDING_KEY: &str = "pending_migration";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub priorities: usize,
    pub routines: usize,
    pub notes: usize,
    pub habits: usize,
    pub reflections: usize,
    pub logs: usize,
}

impl MigrationStats {
    /// Count live guest records in the local store.
    pub fn from_local(store: &LocalStore) -> UrusResult<Self> {
        let count = |table: Table| -> UrusResult<usize> {
            Ok(store
                .read_table(table)?
                .iter()
                .filter(|r| r.get("deletedAt").is_none_or(|d| d.is_null()))
                .count())
        };

        Ok(MigrationStats {
            priorities: count(Table::Priorities)?,
            routines: count(Table::Routines)?,
            notes: count(Table::Notes)?,
            habits: count(Table::Habits)?,
            reflections: count(Table::Reflections)?,
            logs: count(Table::Logs)?,
        })
    }

    pub fn total(&self) -> usize {
        self.priorities + self.routines + self.notes + self.habits + self.reflections + self.logs
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Which account a pending decision belongs to.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingMigration {
    user_id: String,
}

pub(crate) fn mark_pending(store: &LocalStore, user_id: &str) -> UrusResult<()> {
    store.set_state(
        PENDING_KEY,
        &PendingMigration {
            user_id: user_id.to_string(),
        },
    )
}

/// Guest data still awaiting a decision by `user_id`, counted afresh.
pub(crate) fn pending_for(store: &LocalStore, user_id: &str) -> UrusResult<Option<MigrationStats>> {
    let pending: Option<PendingMigration> = store.get_state(PENDING_KEY)?;
    if pending.is_none_or(|p| p.user_id != user_id) {
        return Ok(None);
    }

    let stats = MigrationStats::from_local(store)?;
    if stats.is_empty() {
        store.remove_state(PENDING_KEY)?;
        return Ok(None);
    }
    Ok(Some(stats))
}

pub(crate) fn clear_pending(store: &LocalStore) -> UrusResult<()> {
    store.remove_state(PENDING_KEY)
}

/// Move the guest records into the signed-in account.
///
/// Records go through the active provider, so they reach the cloud (or its
/// offline queue), and are then removed from the guest collections. On
/// failure the decision stays pending so it can be retried.
pub async fn keep_guest_data(storage: &Storage, auth: &AuthSyncManager) -> UrusResult<()> {
    let guest = storage.local();

    if storage.is_cloud_active() {
        let provider = storage.provider();
        let mut moved = 0;
        for table in Table::ALL {
            let records = guest.read_table(table)?;
            if records.is_empty() {
                continue;
            }
            moved += records.len();
            provider.save(table, records).await?;
        }
        guest.clear_tables()?;
        log::info!("Migration: moved {} guest records into the account", moved);
    }

    storage.set_include_guest_data(false);
    clear_pending(guest)?;
    auth.dismiss_migration_dialog();
    Ok(())
}

/// Drop the guest data and reload the account's data from the cloud.
///
/// On failure the decision stays pending so it can be retried.
pub async fn discard_guest_data(storage: &Storage, auth: &AuthSyncManager) -> UrusResult<()> {
    log::info!("Migration: discarding guest data");
    storage.clear_all_data().await?;
    storage.set_include_guest_data(false);
    storage.reset_cache();
    storage.hydrate_cache(true).await?;
    clear_pending(storage.local())?;
    auth.dismiss_migration_dialog();
    Ok(())
}
