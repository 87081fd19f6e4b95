use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RemoteCatalog, RemoteDocument};
use crate::error::{CatalogError, Result};

/// Process-local document collection.
///
/// Used when no remote store is configured, and as the remote side in tests.
/// Reads and writes can be made to fail, and fetches can be slowed down.
#[derive(Default)]
pub struct InMemoryCatalog {
    documents: RwLock<BTreeMap<String, RemoteDocument>>,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    fetch_delay_ms: AtomicUsize,
    fetch_count: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection that already holds `documents`.
    pub fn with_documents(documents: impl IntoIterator<Item = RemoteDocument>) -> Self {
        let map = documents
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        Self {
            documents: RwLock::new(map),
            ..Self::default()
        }
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Number of `fetch_all` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub async fn get(&self, id: &str) -> Option<RemoteDocument> {
        self.documents.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogError::RemoteWriteFailed(
                "in-memory catalog rejecting writes".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCatalog for InMemoryCatalog {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(&self) -> Result<Vec<RemoteDocument>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(CatalogError::RemoteUnreachable(
                "in-memory catalog offline".into(),
            ));
        }
        Ok(self.documents.read().await.values().cloned().collect())
    }

    async fn put(&self, doc: &RemoteDocument) -> Result<()> {
        self.check_writes()?;
        self.documents
            .write()
            .await
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_writes()?;
        self.documents.write().await.remove(id);
        Ok(())
    }
}
