//! Catalog item types shared by the local store, the sync layer and the cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// A menu item as stored in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Row id assigned by the local store. Never sent to the remote.
    pub local_id: i64,
    /// Remote document id. Empty until the row is associated with a document.
    pub remote_id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image_name: String,
}

/// Fields of a catalog item that does not have a local row yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCatalogItem {
    #[serde(default)]
    pub remote_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_name: String,
}

impl NewCatalogItem {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            remote_id: String::new(),
            name: name.into(),
            description: String::new(),
            price,
            image_name: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = image_name.into();
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = remote_id.into();
        self
    }

    /// Attach the id the local store assigned.
    pub fn into_item(self, local_id: i64) -> CatalogItem {
        CatalogItem {
            local_id,
            remote_id: self.remote_id,
            name: self.name,
            description: self.description,
            price: self.price,
            image_name: self.image_name,
        }
    }
}

impl CatalogItem {
    pub fn has_remote_id(&self) -> bool {
        !self.remote_id.is_empty()
    }
}

/// Reject values the schema or the pricing rules cannot hold.
pub(crate) fn validate(name: &str, price: Decimal) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::InvalidItem("name must not be empty".into()));
    }
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CatalogError::InvalidItem(format!(
            "price must be non-negative, got {}",
            price
        )));
    }
    Ok(())
}
