//! The running app session.
//!
//! A `Session` owns the storage layer and the auth sync manager and reacts to
//! identity changes: it picks the provider for the new identity, resets what
//! belonged to the old one, detects guest data on sign-in and hydrates.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::auth_sync::{AuthSyncManager, AuthSyncStatus};
use crate::config::UrusConfig;
use crate::error::{UrusError, UrusResult};
use crate::migration::{self, MigrationStats};
use crate::storage::Storage;
use crate::store::{
    CloudProvider, Credentials, HttpRemote, LocalProvider, LocalStore, QueueReport, RemoteStore,
    User,
};

const SESSION_KEY: &str = "session";

/// Who the session acts for.
pub enum Identity {
    Guest,
    Account {
        user: User,
        remote: Arc<dyn RemoteStore>,
    },
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Guest => None,
            Identity::Account { user, .. } => Some(user),
        }
    }
}

pub struct Session {
    config: UrusConfig,
    storage: Arc<Storage>,
    auth: Arc<AuthSyncManager>,
    user: Mutex<Option<User>>,
    cloud: Mutex<Option<Arc<CloudProvider>>>,
    initialized: OnceCell<()>,
}

impl Session {
    /// Open the local store. Starts as a guest until `initialize` runs.
    pub fn open(config: UrusConfig) -> UrusResult<Self> {
        let local = LocalStore::open(config.data_path())?;
        let storage = Storage::new(local.clone(), Arc::new(LocalProvider::new(local)));

        Ok(Session {
            config,
            storage: Arc::new(storage),
            auth: Arc::new(AuthSyncManager::new()),
            user: Mutex::new(None),
            cloud: Mutex::new(None),
            initialized: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &UrusConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn auth(&self) -> &Arc<AuthSyncManager> {
        &self.auth
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    /// Restore the saved login and load its data. Runs once; later calls
    /// return the current status. Failures are logged and the session is
    /// still marked ready so callers never wait forever.
    pub async fn initialize(&self) -> AuthSyncStatus {
        self.initialized
            .get_or_init(|| async move {
                let identity = self.saved_identity().unwrap_or_else(|e| {
                    log::error!("Session: could not restore login: {}", e);
                    Identity::Guest
                });

                if let Err(e) = self.handle_auth_change(identity, true).await {
                    log::error!("Session: initialization failed: {}", e);
                    self.auth.complete_auth_sync(None);
                }
            })
            .await;

        self.auth.status()
    }

    fn saved_identity(&self) -> UrusResult<Identity> {
        let Some(api_url) = self.config.api_url() else {
            return Ok(Identity::Guest);
        };

        let saved: Option<Credentials> = self.storage.local().get_state(SESSION_KEY)?;
        Ok(match saved {
            Some(credentials) => Identity::Account {
                remote: Arc::new(HttpRemote::new(api_url, &credentials.token)),
                user: credentials.user,
            },
            None => Identity::Guest,
        })
    }

    /// Switch to `identity` and hydrate its data.
    ///
    /// Outside the initial call, switching to the identity already active is
    /// a no-op. Hydration failures end up in the returned status.
    pub async fn handle_auth_change(
        &self,
        identity: Identity,
        initial: bool,
    ) -> UrusResult<AuthSyncStatus> {
        let previous = self.current_user();
        let next = identity.user().cloned();
        let changed = previous.as_ref().map(|u| &u.id) != next.as_ref().map(|u| &u.id);

        if !initial && !changed {
            return Ok(self.auth.status());
        }

        let guest = self.storage.local();
        if next.is_none() {
            let previous_cloud = self.cloud.lock().take();
            if let Some(cloud) = previous_cloud {
                cloud.queue().clear()?;
                log::info!("Session: cleared offline queue on sign-out");
            }
            migration::clear_pending(guest)?;
        }

        // Guest data is looked for when a guest signs in; a decision left
        // open by an earlier run is picked up again for the same account.
        let guest_data = match &next {
            Some(user) if !initial && previous.is_none() => {
                let stats = MigrationStats::from_local(guest)?;
                if stats.is_empty() {
                    None
                } else {
                    migration::mark_pending(guest, &user.id)?;
                    Some(stats)
                }
            }
            Some(user) => migration::pending_for(guest, &user.id)?,
            None => None,
        };

        if changed {
            self.storage.reset_cache();
            if let Some(user) = &next {
                self.storage.clear_sync_tokens(&user.id)?;
            }
        }

        *self.user.lock() = next.clone();
        self.storage.set_current_user_id(next.as_ref().map(|u| u.id.clone()));

        match identity {
            Identity::Account { user, remote } => {
                let mirror = self.storage.local().user_store(&user.id)?;
                let cloud = Arc::new(CloudProvider::new(remote, mirror));
                *self.cloud.lock() = Some(Arc::clone(&cloud));
                self.storage.set_provider(cloud);
                log::info!("Session: signed in as {}", user.label());
            }
            Identity::Guest => {
                *self.cloud.lock() = None;
                self.storage
                    .set_provider(Arc::new(LocalProvider::new(self.storage.local().clone())));
                log::info!("Session: guest mode");
            }
        }

        let is_cloud = next.is_some();
        self.storage.set_include_guest_data(guest_data.is_some());
        self.auth.start_auth_sync(next, is_cloud);
        match guest_data {
            Some(stats) => {
                log::info!("Session: found {} guest records", stats.total());
                self.auth.flag_migration(stats);
            }
            None => {
                self.auth.dismiss_migration_dialog();
            }
        }

        let hydrated = self.storage.hydrate_cache(false).await;
        self.auth.complete_auth_sync(hydrated.err());

        Ok(self.auth.wait_for_auth_sync().await)
    }

    /// Sign in against the configured cloud backend.
    pub async fn login(&self, email: &str, password: &str) -> UrusResult<AuthSyncStatus> {
        let api_url = self
            .config
            .api_url()
            .ok_or_else(|| UrusError::Config("cloud.api_url is not set".into()))?;

        let credentials = HttpRemote::login(api_url, email, password).await?;
        self.storage.local().set_state(SESSION_KEY, &credentials)?;

        let remote = Arc::new(HttpRemote::new(api_url, &credentials.token));
        self.handle_auth_change(
            Identity::Account {
                user: credentials.user,
                remote,
            },
            false,
        )
        .await
    }

    pub async fn logout(&self) -> UrusResult<AuthSyncStatus> {
        self.storage.local().remove_state(SESSION_KEY)?;
        self.handle_auth_change(Identity::Guest, false).await
    }

    /// Cloud writes waiting in the offline queue. Always zero for a guest.
    pub fn pending_writes(&self) -> usize {
        self.cloud.lock().as_ref().map_or(0, |cloud| cloud.queue().len())
    }

    /// Replay queued offline writes, then reload everything.
    pub async fn refresh(&self) -> UrusResult<Option<QueueReport>> {
        let cloud = self.cloud.lock().clone();
        let report = match cloud {
            Some(cloud) => Some(cloud.process_offline_queue().await?),
            None => None,
        };

        self.storage.hydrate_cache(true).await?;
        Ok(report)
    }
}
