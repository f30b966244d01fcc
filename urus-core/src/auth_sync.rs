//! Auth sync state.
//!
//! Tracks whether the data for the current identity has been loaded. Every
//! identity change runs one sync: `start_auth_sync` when it begins,
//! `complete_auth_sync` when hydration finishes. Anything that needs data to
//! be in place awaits `wait_for_auth_sync` first.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::UrusError;
use crate::flight::{Flight, FlightDone, flight};
use crate::migration::MigrationStats;
use crate::observers::{ListenerId, Observers};
use crate::store::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthSyncState {
    #[default]
    Idle,
    Syncing,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSyncStatus {
    pub state: AuthSyncState,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_cloud_mode: bool,
    pub error: Option<Arc<UrusError>>,
    /// Guest data found when signing in, waiting for a keep/discard decision.
    pub pending_migration: Option<MigrationStats>,
}

/// Completion handle of one sync. Clones compare equal with `same_as`.
pub type SyncHandle = Flight<()>;

#[derive(Default)]
struct Inner {
    status: AuthSyncStatus,
    pending: Option<(FlightDone<()>, SyncHandle)>,
}

#[derive(Default)]
pub struct AuthSyncManager {
    inner: Mutex<Inner>,
    listeners: Arc<Observers<AuthSyncStatus>>,
}

/// Registration returned by `subscribe`.
#[must_use = "dropping a Subscription does not unsubscribe; call unsubscribe()"]
pub struct Subscription {
    id: ListenerId,
    listeners: Arc<Observers<AuthSyncStatus>>,
}

impl Subscription {
    pub fn unsubscribe(self) -> bool {
        self.listeners.remove(self.id)
    }
}

impl AuthSyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a sync for `user`. While one is already running, its handle is
    /// returned and nothing else changes.
    pub fn start_auth_sync(&self, user: Option<User>, is_cloud: bool) -> SyncHandle {
        let (handle, snapshot) = {
            let mut inner = self.inner.lock();
            if inner.status.state == AuthSyncState::Syncing
                && let Some((_, running)) = &inner.pending
            {
                return running.clone();
            }

            let (done, handle) = flight();
            inner.pending = Some((done, handle.clone()));
            inner.status.state = AuthSyncState::Syncing;
            inner.status.is_authenticated = user.is_some();
            inner.status.user = user;
            inner.status.is_cloud_mode = is_cloud;
            inner.status.error = None;
            (handle, inner.status.clone())
        };

        log::debug!(
            "Auth sync: started for {}",
            snapshot.user.as_ref().map_or("guest", User::label)
        );
        self.listeners.notify(&snapshot);
        handle
    }

    /// Finish the running sync. Without a running sync only the state moves.
    pub fn complete_auth_sync(&self, error: Option<UrusError>) {
        let (done, snapshot) = {
            let mut inner = self.inner.lock();
            match &error {
                Some(e) => {
                    log::warn!("Auth sync: failed: {}", e);
                    inner.status.state = AuthSyncState::Error;
                }
                None => inner.status.state = AuthSyncState::Ready,
            }
            inner.status.error = error.map(Arc::new);
            (inner.pending.take(), inner.status.clone())
        };

        self.listeners.notify(&snapshot);
        if let Some((done, _)) = done {
            done.resolve(());
        }
    }

    /// Wait for the running sync, if any, and return the resulting status.
    pub async fn wait_for_auth_sync(&self) -> AuthSyncStatus {
        let pending = self.inner.lock().pending.as_ref().map(|(_, h)| h.clone());
        if let Some(handle) = pending {
            handle.wait().await;
        }
        self.status()
    }

    /// Register a listener. It is called right away with the current status.
    ///
    /// Registration and the snapshot happen under the state lock, so every
    /// transition after the snapshot reaches the listener.
    pub fn subscribe(
        &self,
        listener: impl Fn(&AuthSyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let listener = Arc::new(listener);
        let (id, current) = {
            let inner = self.inner.lock();
            let registered = Arc::clone(&listener);
            let id = self.listeners.add(move |status| (*registered)(status));
            (id, inner.status.clone())
        };
        (*listener)(&current);
        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    pub fn status(&self) -> AuthSyncStatus {
        self.inner.lock().status.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.lock().status.state == AuthSyncState::Syncing
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().status.state == AuthSyncState::Ready
    }

    /// Back to `Idle`. A running sync's waiters are released.
    pub fn reset(&self) {
        let (pending, snapshot) = {
            let mut inner = self.inner.lock();
            let pending = inner.pending.take();
            inner.status = AuthSyncStatus::default();
            (pending, inner.status.clone())
        };

        if let Some((done, _)) = pending {
            done.resolve(());
        }
        self.listeners.notify(&snapshot);
    }

    pub fn flag_migration(&self, stats: MigrationStats) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.status.pending_migration = Some(stats);
            inner.status.clone()
        };
        self.listeners.notify(&snapshot);
    }

    /// Clear the pending migration decision. Returns false if none was pending.
    pub fn dismiss_migration_dialog(&self) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.status.pending_migration.take().is_none() {
                return false;
            }
            inner.status.clone()
        };
        self.listeners.notify(&snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".into(),
            email: Some("a@b.c".into()),
        }
    }

    #[test]
    fn test_concurrent_starts_share_one_handle() {
        let auth = AuthSyncManager::new();
        let first = auth.start_auth_sync(Some(user()), true);
        let second = auth.start_auth_sync(None, false);

        assert!(first.same_as(&second));
        let status = auth.status();
        assert!(status.is_authenticated);
        assert!(status.is_cloud_mode);

        auth.complete_auth_sync(None);
        let third = auth.start_auth_sync(None, false);
        assert!(!first.same_as(&third));
    }

    #[tokio::test]
    async fn test_waiters_see_ready_state() {
        let auth = Arc::new(AuthSyncManager::new());
        auth.start_auth_sync(Some(user()), true);

        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.wait_for_auth_sync().await })
        };
        tokio::task::yield_now().await;
        auth.complete_auth_sync(None);

        let status = waiter.await.unwrap();
        assert_eq!(status.state, AuthSyncState::Ready);
        assert_eq!(status.user, Some(user()));
        assert!(auth.is_ready());
    }

    #[tokio::test]
    async fn test_error_is_captured_not_thrown() {
        let auth = AuthSyncManager::new();
        auth.start_auth_sync(None, false);
        auth.complete_auth_sync(Some(UrusError::Hydration("boom".into())));

        let status = auth.wait_for_auth_sync().await;
        assert_eq!(status.state, AuthSyncState::Error);
        assert!(status.error.is_some());

        auth.start_auth_sync(None, false);
        assert!(auth.status().error.is_none());
    }

    #[test]
    fn test_complete_without_start_only_moves_state() {
        let auth = AuthSyncManager::new();
        auth.complete_auth_sync(None);
        assert!(auth.is_ready());
    }

    #[test]
    fn test_subscriber_replay_and_unsubscribe() {
        let auth = AuthSyncManager::new();
        auth.start_auth_sync(Some(user()), true);
        auth.complete_auth_sync(None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = seen.clone();
            auth.subscribe(move |s| seen.lock().push(s.state))
        };
        assert_eq!(*seen.lock(), vec![AuthSyncState::Ready]);

        auth.start_auth_sync(None, false);
        assert!(subscription.unsubscribe());
        auth.complete_auth_sync(None);

        assert_eq!(
            *seen.lock(),
            vec![AuthSyncState::Ready, AuthSyncState::Syncing]
        );
    }

    #[test]
    fn test_subscriber_mid_sync_sees_completion() {
        let auth = AuthSyncManager::new();
        auth.start_auth_sync(Some(user()), true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = seen.clone();
            auth.subscribe(move |s| seen.lock().push(s.state))
        };
        auth.complete_auth_sync(None);

        assert_eq!(
            *seen.lock(),
            vec![AuthSyncState::Syncing, AuthSyncState::Ready]
        );
        assert!(subscription.unsubscribe());
    }

    #[test]
    fn test_migration_flag_dismissed_once() {
        let auth = AuthSyncManager::new();
        let stats = MigrationStats {
            priorities: 1,
            ..Default::default()
        };
        auth.flag_migration(stats.clone());
        assert_eq!(auth.status().pending_migration, Some(stats));

        assert!(auth.dismiss_migration_dialog());
        assert!(!auth.dismiss_migration_dialog());
        assert!(auth.status().pending_migration.is_none());
    }

    #[tokio::test]
    async fn test_reset_releases_waiters() {
        let auth = AuthSyncManager::new();
        let handle = auth.start_auth_sync(None, false);
        auth.reset();

        assert_eq!(handle.wait().await, Some(()));
        assert_eq!(auth.status().state, AuthSyncState::Idle);
    }
}
