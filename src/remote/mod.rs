//! Remote catalog backends.
//!
//! The menu is mirrored in a remote document collection (`menu_items`). Each
//! document carries `name`, `description`, `price` and `imageName`, and is
//! addressed by an opaque id the client generates before the first write.
//!
//! Two backends implement [`RemoteCatalog`]:
//! - **Firestore**: REST client for a real document store
//! - **In-memory**: process-local collection for offline mode and tests

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CatalogItem, NewCatalogItem};

pub use firestore::FirestoreCatalog;
pub use memory::InMemoryCatalog;

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "menu_items";

/// A catalog document as it exists in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    #[serde(rename = "imageName")]
    pub image_name: String,
}

impl RemoteDocument {
    /// Build the outbound document for a local row. Local ids stay local.
    pub fn from_item(item: &CatalogItem) -> Self {
        Self {
            id: item.remote_id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            price: item.price,
            image_name: item.image_name.clone(),
        }
    }

    /// Insert payload for reconciliation, keeping the document id.
    pub fn into_new_item(self) -> NewCatalogItem {
        NewCatalogItem {
            remote_id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            image_name: self.image_name,
        }
    }
}

/// A remote document collection holding the menu.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Fetch every document in the collection.
    async fn fetch_all(&self) -> Result<Vec<RemoteDocument>>;

    /// Create or overwrite the document with `doc.id`.
    async fn put(&self, doc: &RemoteDocument) -> Result<()>;

    /// Delete the document with `id`. Missing documents are not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Generate a document id on the client, ahead of the first write.
pub fn allocate_remote_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
