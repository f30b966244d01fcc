//! Core of urus: a local-first store for routines, priorities and journal
//! data, with optional cloud sync and smart calendar sync.
//!
//! - `session` owns everything and reacts to sign-in and sign-out
//! - `storage` serves the in-memory cache and persists through a provider
//! - `auth_sync` tracks whether data for the current identity is loaded
//! - `calendar` pushes today's schedule into a device calendar

pub mod auth_sync;
pub mod backup;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod flight;
pub mod migration;
pub mod model;
pub mod observers;
pub mod session;
pub mod storage;
pub mod store;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use auth_sync::{AuthSyncManager, AuthSyncState, AuthSyncStatus, Subscription, SyncHandle};
pub use config::UrusConfig;
pub use error::{UrusError, UrusResult};
pub use migration::MigrationStats;
pub use session::{Identity, Session};
pub use storage::Storage;
