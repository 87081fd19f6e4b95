//! Local-first synchronisation between the menu cache and the remote catalog.
//!
//! - **Reads** always come from the [`LocalStore`].
//! - **Refresh** pulls the whole remote collection and swaps it into the
//!   local store in one transaction. Remote wins on refresh.
//! - **Mutations** hit the local store first, then a background task pushes
//!   the change outward. Local wins until the next successful refresh.
//!
//! Concurrent `refresh()` calls share a single in-flight fetch. The fetch runs
//! on its own task, so a caller that stops waiting does not cancel it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::db::LocalStore;
use crate::error::{CatalogError, Result};
use crate::models::{self, CatalogItem, NewCatalogItem};
use crate::remote::{allocate_remote_id, RemoteCatalog, RemoteDocument};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What a successful refresh did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The local store now mirrors the remote collection.
    Replaced { count: usize },
    /// The remote was empty while local rows existed; nothing changed.
    SkippedEmptyRemote,
}

/// Snapshot of the coordinator's state for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub backend: String,
    pub refreshing: bool,
    pub last_outcome: Option<RefreshOutcome>,
    pub last_error: Option<String>,
    /// RFC 3339 time of the last finished refresh, successful or not.
    pub last_refresh_at: Option<String>,
    pub failed_writes: u64,
}

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<RefreshOutcome, Arc<CatalogError>>>>;
type WriteTail = Shared<BoxFuture<'static, ()>>;

/// An outbound change to the remote catalog.
#[derive(Debug, Clone)]
enum RemoteWrite {
    Put(RemoteDocument),
    Delete(String),
}

impl std::fmt::Display for RemoteWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteWrite::Put(doc) => write!(f, "put {}", doc.id),
            RemoteWrite::Delete(id) => write!(f, "delete {}", id),
        }
    }
}

struct Inner {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteCatalog>,
    fetch_timeout: Duration,
    in_flight: Mutex<Option<SharedRefresh>>,
    /// Completion of the most recently queued remote write.
    write_tail: Mutex<Option<WriteTail>>,
    status: Mutex<SyncStatus>,
}

/// Reconciles the local store with a remote catalog.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SyncCoordinator {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteCatalog>) -> Self {
        Self::with_fetch_timeout(store, remote, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteCatalog>,
        fetch_timeout: Duration,
    ) -> Self {
        let status = SyncStatus {
            backend: remote.backend().to_string(),
            ..SyncStatus::default()
        };
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                fetch_timeout,
                in_flight: Mutex::new(None),
                write_tail: Mutex::new(None),
                status: Mutex::new(status),
            }),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    /// Current menu, from the local store.
    pub fn list(&self) -> Result<Vec<CatalogItem>> {
        self.inner.store.list()
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = lock(&self.inner.status).clone();
        status.refreshing = lock(&self.inner.in_flight).is_some();
        status
    }

    /// Pull the remote catalog and reconcile it into the local store.
    ///
    /// If a refresh is already running, waits for it and returns its result.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let shared = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(running) => {
                    tracing::debug!("Refresh already in flight, joining it");
                    running.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let task = tokio::spawn(async move {
                        let result = inner.run_refresh().await.map_err(Arc::new);
                        inner.finish_refresh(&result);
                        result
                    });
                    let shared = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(Arc::new(CatalogError::RemoteUnreachable(format!(
                                "refresh task failed: {}",
                                e
                            )))),
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        shared.await.map_err(|e| duplicate_error(&e))
    }

    /// Insert locally under a freshly allocated remote id, then push it.
    pub async fn create_item(&self, item: NewCatalogItem) -> Result<CatalogItem> {
        let mut item = item;
        if item.remote_id.is_empty() {
            item.remote_id = allocate_remote_id();
        }

        let local_id = self.inner.store.insert(&item)?;
        let created = item.into_item(local_id);
        tracing::info!(
            "Created menu item {} ({}) as remote {}",
            created.local_id,
            created.name,
            created.remote_id
        );

        self.dispatch(RemoteWrite::Put(RemoteDocument::from_item(&created)));
        Ok(created)
    }

    /// Update locally, then push the stored row if it has a remote id.
    pub async fn update_item(&self, item: &CatalogItem) -> Result<()> {
        self.inner.store.update(item)?;

        // The stored remote id wins over whatever the caller passed.
        match self.inner.store.get(item.local_id)? {
            Some(stored) if stored.has_remote_id() => {
                self.dispatch(RemoteWrite::Put(RemoteDocument::from_item(&stored)));
            }
            _ => tracing::debug!(
                "Menu item {} has no remote id, skipping remote update",
                item.local_id
            ),
        }
        Ok(())
    }

    /// Delete locally, then remove the remote document if there is one.
    pub async fn delete_item(&self, local_id: i64, remote_id: &str) -> Result<()> {
        self.inner.store.delete(local_id)?;
        if !remote_id.is_empty() {
            self.dispatch(RemoteWrite::Delete(remote_id.to_string()));
        }
        Ok(())
    }

    /// Wait until every remote write queued so far has finished.
    pub async fn flush(&self) {
        let tail = lock(&self.inner.write_tail).clone();
        if let Some(tail) = tail {
            tail.await;
        }
    }

    /// Queue a best-effort remote write behind the previous one.
    fn dispatch(&self, write: RemoteWrite) {
        let inner = self.inner.clone();
        let mut tail = lock(&self.inner.write_tail);
        let previous = tail.take();

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            inner.apply_write(write).await;
        });

        *tail = Some(
            async move {
                let _ = task.await;
            }
            .boxed()
            .shared(),
        );
    }
}

impl Inner {
    async fn run_refresh(&self) -> Result<RefreshOutcome> {
        tracing::info!("Refreshing menu from {} catalog", self.remote.backend());

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.remote.fetch_all()).await
        {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                tracing::warn!("Remote fetch failed: {}, keeping local menu", e);
                return Err(match e {
                    CatalogError::RemoteUnreachable(_) => e,
                    other => CatalogError::RemoteUnreachable(other.to_string()),
                });
            }
            Err(_) => {
                tracing::warn!(
                    "Remote fetch timed out after {:?}, keeping local menu",
                    self.fetch_timeout
                );
                return Err(CatalogError::RemoteUnreachable(format!(
                    "fetch timed out after {:?}",
                    self.fetch_timeout
                )));
            }
        };

        let items: Vec<NewCatalogItem> = fetched
            .into_iter()
            .filter_map(|doc| match models::validate(&doc.name, doc.price) {
                Ok(()) => Some(doc.into_new_item()),
                Err(e) => {
                    tracing::warn!("Skipping remote menu document {}: {}", doc.id, e);
                    None
                }
            })
            .collect();

        // An empty remote is treated as not provisioned yet, never as "delete everything".
        match self.store.replace_all_unless_emptied(&items)? {
            Some(count) => Ok(RefreshOutcome::Replaced { count }),
            None => {
                tracing::info!("Remote catalog is empty, keeping local menu");
                Ok(RefreshOutcome::SkippedEmptyRemote)
            }
        }
    }

    fn finish_refresh(&self, result: &std::result::Result<RefreshOutcome, Arc<CatalogError>>) {
        {
            let mut status = lock(&self.status);
            status.last_refresh_at = Some(chrono::Utc::now().to_rfc3339());
            match result {
                Ok(outcome) => {
                    status.last_outcome = Some(*outcome);
                    status.last_error = None;
                }
                Err(e) => status.last_error = Some(e.to_string()),
            }
        }
        *lock(&self.in_flight) = None;
    }

    async fn apply_write(&self, write: RemoteWrite) {
        let result = match &write {
            RemoteWrite::Put(doc) => self.remote.put(doc).await,
            RemoteWrite::Delete(id) => self.remote.delete(id).await,
        };

        match result {
            Ok(()) => tracing::debug!("Remote {} succeeded", write),
            Err(e) => {
                // Not retried: the next successful refresh overwrites local state anyway.
                tracing::warn!("Remote {} failed: {}", write, e);
                lock(&self.status).failed_writes += 1;
            }
        }
    }
}

/// Rebuild an error handed out to several refresh waiters.
fn duplicate_error(err: &CatalogError) -> CatalogError {
    match err {
        CatalogError::RemoteUnreachable(m) => CatalogError::RemoteUnreachable(m.clone()),
        CatalogError::WriteFailed(m) => CatalogError::WriteFailed(m.clone()),
        CatalogError::InvalidItem(m) => CatalogError::InvalidItem(m.clone()),
        CatalogError::StorageUnavailable(m) => CatalogError::StorageUnavailable(m.clone()),
        other => CatalogError::StorageUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryCatalog;
    use rust_decimal::Decimal;

    fn doc(id: &str, name: &str, cents: i64) -> RemoteDocument {
        RemoteDocument {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price: Decimal::new(cents, 2),
            image_name: String::new(),
        }
    }

    fn setup(
        seeded: bool,
        docs: Vec<RemoteDocument>,
    ) -> (SyncCoordinator, Arc<LocalStore>, Arc<InMemoryCatalog>) {
        let store = Arc::new(if seeded {
            LocalStore::open_in_memory().unwrap()
        } else {
            LocalStore::open_in_memory_unseeded().unwrap()
        });
        let remote = Arc::new(InMemoryCatalog::with_documents(docs));
        let coordinator = SyncCoordinator::new(store.clone(), remote.clone());
        (coordinator, store, remote)
    }

    #[tokio::test]
    async fn test_refresh_into_empty_store() {
        let (sync, store, _) = setup(false, vec![doc("x1", "Soup", 450)]);

        let outcome = sync.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { count: 1 });

        let items = store.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].remote_id, "x1");
        assert_eq!(items[0].price, Decimal::new(450, 2));
    }

    #[tokio::test]
    async fn test_empty_remote_never_wipes_local() {
        let (sync, store, _) = setup(true, vec![]);
        let before = store.list().unwrap();
        assert!(!before.is_empty());

        let outcome = sync.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::SkippedEmptyRemote);
        assert_eq!(store.list().unwrap(), before);
    }

    #[tokio::test]
    async fn test_empty_remote_with_empty_store() {
        let (sync, store, _) = setup(false, vec![]);
        let outcome = sync.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { count: 0 });
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_remote_documents_are_skipped() {
        let (sync, store, _) = setup(
            false,
            vec![doc("a", "Pho", 1100), doc("b", "  ", 300), doc("c", "Refund", -100)],
        );

        let outcome = sync.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { count: 1 });
        assert_eq!(store.list().unwrap()[0].remote_id, "a");
    }

    #[tokio::test]
    async fn test_only_invalid_documents_never_wipe_local() {
        let (sync, store, _) = setup(true, vec![doc("b", "", 300)]);
        let before = store.list().unwrap();

        let outcome = sync.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::SkippedEmptyRemote);
        assert_eq!(store.list().unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_remote_refresh_racing_insert_keeps_row() {
        for _ in 0..200 {
            let (sync, store, _) = setup(false, vec![]);

            let writer = {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .insert(&NewCatalogItem::new("X", Decimal::new(100, 2)))
                        .unwrap()
                })
            };
            let outcome = sync.refresh().await.unwrap();
            writer.join().unwrap();

            // Whichever ran first, the inserted row survives.
            assert_eq!(store.count().unwrap(), 1, "outcome was {:?}", outcome);
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_local_rows() {
        let (sync, store, _) = setup(
            true,
            vec![doc("a", "Pho", 1100), doc("b", "Bao", 650)],
        );
        let old_max = store.list().unwrap().iter().map(|i| i.local_id).max().unwrap();

        sync.refresh().await.unwrap();

        let items = store.list().unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Bao", "Pho"]);
        assert!(items.iter().all(|i| i.local_id > old_max));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_store_untouched() {
        let (sync, store, remote) = setup(true, vec![doc("a", "Pho", 1100)]);
        remote.set_fail_fetches(true);
        let before = store.list().unwrap();

        let err = sync.refresh().await.unwrap_err();
        assert!(matches!(err, CatalogError::RemoteUnreachable(_)));
        assert_eq!(store.list().unwrap(), before);
        assert!(sync.status().last_error.is_some());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let remote = Arc::new(InMemoryCatalog::with_documents([doc("a", "Pho", 1100)]));
        remote.set_fetch_delay(Duration::from_millis(200));
        let sync =
            SyncCoordinator::with_fetch_timeout(store.clone(), remote, Duration::from_millis(20));

        let err = sync.refresh().await.unwrap_err();
        assert!(matches!(err, CatalogError::RemoteUnreachable(_)));
        assert!(store.find_by_remote_id("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let (sync, _, remote) = setup(false, vec![doc("x1", "Soup", 450)]);
        remote.set_fetch_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(sync.refresh(), sync.refresh());
        assert_eq!(a.unwrap(), RefreshOutcome::Replaced { count: 1 });
        assert_eq!(b.unwrap(), RefreshOutcome::Replaced { count: 1 });
        assert_eq!(remote.fetch_count(), 1);

        // Once finished, the next call fetches again.
        sync.refresh().await.unwrap();
        assert_eq!(remote.fetch_count(), 2);
        assert!(!sync.status().refreshing);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_still_applies() {
        let (sync, store, remote) = setup(false, vec![doc("x1", "Soup", 450)]);
        remote.set_fetch_delay(Duration::from_millis(50));

        let abandoned = tokio::time::timeout(Duration::from_millis(5), sync.refresh()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.find_by_remote_id("x1").unwrap().unwrap().name, "Soup");
        assert_eq!(
            sync.status().last_outcome,
            Some(RefreshOutcome::Replaced { count: 1 })
        );
    }

    #[tokio::test]
    async fn test_create_item_assigns_remote_id_and_pushes() {
        let (sync, store, remote) = setup(false, vec![]);

        let created = sync
            .create_item(NewCatalogItem::new("Soup", Decimal::new(450, 2)))
            .await
            .unwrap();
        assert!(created.has_remote_id());
        assert_eq!(store.get(created.local_id).unwrap().unwrap(), created);

        sync.flush().await;
        let pushed = remote.get(&created.remote_id).await.unwrap();
        assert_eq!(pushed.name, "Soup");
    }

    #[tokio::test]
    async fn test_remote_write_failure_keeps_local_row() {
        let (sync, store, remote) = setup(false, vec![]);
        remote.set_fail_writes(true);

        let created = sync
            .create_item(NewCatalogItem::new("Soup", Decimal::new(450, 2)))
            .await
            .unwrap();
        sync.flush().await;

        assert!(store.get(created.local_id).unwrap().is_some());
        assert!(remote.is_empty().await);
        assert_eq!(sync.status().failed_writes, 1);
    }

    #[tokio::test]
    async fn test_update_pushes_only_with_remote_id() {
        let (sync, store, remote) = setup(false, vec![]);

        let local_only = store
            .insert(&NewCatalogItem::new("Bread", Decimal::new(200, 2)))
            .unwrap();
        let mut row = store.get(local_only).unwrap().unwrap();
        row.price = Decimal::new(250, 2);
        sync.update_item(&row).await.unwrap();
        sync.flush().await;
        assert!(remote.is_empty().await);

        let mut synced = sync
            .create_item(NewCatalogItem::new("Soup", Decimal::new(450, 2)))
            .await
            .unwrap();
        synced.name = "Tomato Soup".into();
        sync.update_item(&synced).await.unwrap();
        sync.flush().await;
        assert_eq!(
            remote.get(&synced.remote_id).await.unwrap().name,
            "Tomato Soup"
        );
    }

    #[tokio::test]
    async fn test_writes_reach_remote_in_order() {
        let (sync, store, remote) = setup(false, vec![]);

        let created = sync
            .create_item(NewCatalogItem::new("Soup", Decimal::new(450, 2)))
            .await
            .unwrap();
        sync.delete_item(created.local_id, &created.remote_id)
            .await
            .unwrap();
        sync.flush().await;

        assert!(store.get(created.local_id).unwrap().is_none());
        assert!(remote.get(&created.remote_id).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_without_remote_id_is_local_only() {
        let (sync, store, remote) = setup(false, vec![doc("keep", "Pho", 1100)]);
        let id = store
            .insert(&NewCatalogItem::new("Bread", Decimal::new(200, 2)))
            .unwrap();

        sync.delete_item(id, "").await.unwrap();
        sync.delete_item(id, "").await.unwrap();
        sync.flush().await;

        assert!(store.get(id).unwrap().is_none());
        assert_eq!(remote.len().await, 1);
    }
}
