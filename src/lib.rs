pub mod cart;
pub mod checkout;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod settings;
pub mod sync;

use std::sync::{Arc, Once};
use std::time::Duration;

use db::LocalStore;
use error::Result;
use remote::{FirestoreCatalog, InMemoryCatalog, RemoteCatalog};
use settings::Settings;
use sync::SyncCoordinator;

/// Everything a front end needs, wired from settings.
pub struct MenuApp {
    pub settings: Settings,
    pub store: Arc<LocalStore>,
    pub sync: SyncCoordinator,
}

impl MenuApp {
    /// Open the local store and connect the configured remote catalog.
    pub fn open(settings: Settings) -> Result<Self> {
        let db_path = settings.database_path();
        tracing::info!("Database path: {}", db_path.display());
        let store = Arc::new(LocalStore::open_with(&db_path, settings.seed_catalog)?);

        let remote = remote_from_settings(&settings);
        tracing::info!("Remote catalog backend: {}", remote.backend());

        let sync = SyncCoordinator::with_fetch_timeout(
            store.clone(),
            remote,
            Duration::from_secs(settings.remote.fetch_timeout_secs),
        );

        Ok(Self {
            settings,
            store,
            sync,
        })
    }
}

/// Firestore when enabled and configured, otherwise a process-local catalog.
pub fn remote_from_settings(settings: &Settings) -> Arc<dyn RemoteCatalog> {
    let remote = &settings.remote;
    if remote.enabled && !remote.project_id.is_empty() {
        ensure_tls_provider();
        return Arc::new(FirestoreCatalog::new(remote));
    }
    if remote.enabled {
        tracing::warn!("Remote sync enabled without a project id, running offline");
    }
    Arc::new(InMemoryCatalog::new())
}

/// Install ring as the rustls crypto provider (once per process).
pub fn ensure_tls_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("A rustls crypto provider was already installed");
        }
    });
}

/// Initialize logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("delivery_menu=info")),
        )
        .try_init();
}
