pub mod schema;
pub mod seed;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::{CatalogError, Result};
use crate::models::{self, CatalogItem, NewCatalogItem};

/// Decimal places kept when reading prices back from REAL columns.
const PRICE_SCALE: u32 = 4;

const SELECT_ITEMS: &str =
    "SELECT id, firebase_id, name, description, price, imageName FROM menu_items";

/// Thread-safe local catalog store.
///
/// Every operation locks the single connection for its whole duration, so
/// writers never interleave and `replace_all` is never observed half-applied.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open or create the menu database, seeding it on first launch.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open or create the menu database. `seed` controls first-launch seeding.
    pub fn open_with(path: &Path, seed: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CatalogError::StorageUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            CatalogError::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        tracing::info!("Menu database opened at {}", path.display());
        Self::from_connection(conn, seed)
    }

    /// Open a seeded in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Self::memory_connection()?, true)
    }

    /// Open an empty in-memory database (for testing).
    pub fn open_in_memory_unseeded() -> Result<Self> {
        Self::from_connection(Self::memory_connection()?, false)
    }

    fn memory_connection() -> Result<Connection> {
        Connection::open_in_memory().map_err(|e| CatalogError::StorageUnavailable(e.to_string()))
    }

    fn from_connection(mut conn: Connection, seed: bool) -> Result<Self> {
        schema::initialize_schema(&conn)
            .map_err(|e| CatalogError::StorageUnavailable(format!("schema setup failed: {}", e)))?;
        if seed {
            seed::seed_if_empty(&mut conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CatalogError::StorageUnavailable(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// All items ordered by name ascending.
    pub fn list(&self) -> Result<Vec<CatalogItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("{} ORDER BY name ASC, id ASC", SELECT_ITEMS))
                .map_err(storage_unavailable)?;
            let rows = stmt
                .query_map([], item_from_row)
                .map_err(storage_unavailable)?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(storage_unavailable)?);
            }
            Ok(results)
        })
    }

    /// Get an item by its local id.
    pub fn get(&self, local_id: i64) -> Result<Option<CatalogItem>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_ITEMS),
                    rusqlite::params![local_id],
                    item_from_row,
                )
                .optional()
                .map_err(storage_unavailable)?)
        })
    }

    /// Get the item correlated with a remote document, if any.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<CatalogItem>> {
        if remote_id.is_empty() {
            return Ok(None);
        }
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE firebase_id = ?1", SELECT_ITEMS),
                    rusqlite::params![remote_id],
                    item_from_row,
                )
                .optional()
                .map_err(storage_unavailable)?)
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.with_conn(|conn| count_rows(conn))
    }

    /// Persist a new item and return its local id.
    pub fn insert(&self, item: &NewCatalogItem) -> Result<i64> {
        models::validate(&item.name, item.price)?;
        let id = self.with_conn(|conn| insert_row(conn, item))?;
        tracing::debug!("Inserted menu item {} ({})", id, item.name);
        Ok(id)
    }

    /// Replace the row matching `item.local_id`.
    ///
    /// A remote id already stored on the row is kept; an empty one is filled
    /// from `item.remote_id`.
    pub fn update(&self, item: &CatalogItem) -> Result<()> {
        models::validate(&item.name, item.price)?;
        let price = price_to_sql(item.price)?;
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE menu_items SET
                    name = ?1,
                    description = ?2,
                    price = ?3,
                    imageName = ?4,
                    firebase_id = CASE
                        WHEN firebase_id IS NULL OR firebase_id = '' THEN NULLIF(?5, '')
                        ELSE firebase_id
                    END
                 WHERE id = ?6",
                rusqlite::params![
                    item.name,
                    item.description,
                    price,
                    item.image_name,
                    item.remote_id,
                    item.local_id
                ],
            )
            .map_err(write_failed)
        })?;

        if changed == 0 {
            return Err(CatalogError::WriteFailed(format!(
                "no menu item with id {}",
                item.local_id
            )));
        }
        tracing::debug!("Updated menu item {}", item.local_id);
        Ok(())
    }

    /// Remove a row. Deleting an unknown id is not an error.
    pub fn delete(&self, local_id: i64) -> Result<()> {
        let removed = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM menu_items WHERE id = ?1",
                rusqlite::params![local_id],
            )
            .map_err(write_failed)
        })?;
        tracing::debug!("Deleted menu item {} ({} rows)", local_id, removed);
        Ok(())
    }

    /// Atomically swap the whole table for `items`.
    ///
    /// Runs in one transaction while holding the connection lock: readers see
    /// either the previous rows or the new rows. On any failure the previous
    /// rows are kept.
    pub fn replace_all(&self, items: &[NewCatalogItem]) -> Result<usize> {
        Ok(self.swap_rows(items, false)?.unwrap_or(0))
    }

    /// Like [`replace_all`](Self::replace_all), except an empty `items` never
    /// clears a table that still has rows. Returns `None` when the swap was
    /// skipped.
    ///
    /// The row count is read inside the same transaction as the delete, so a
    /// row inserted concurrently is either counted or not yet written.
    pub fn replace_all_unless_emptied(&self, items: &[NewCatalogItem]) -> Result<Option<usize>> {
        self.swap_rows(items, true)
    }

    fn swap_rows(&self, items: &[NewCatalogItem], keep_nonempty: bool) -> Result<Option<usize>> {
        for item in items {
            models::validate(&item.name, item.price)?;
        }

        let swapped = self.with_conn(|conn| {
            let tx = conn.transaction().map_err(write_failed)?;
            if keep_nonempty && items.is_empty() {
                let existing = count_rows(&tx)?;
                if existing > 0 {
                    tracing::debug!("Empty source, keeping {} local menu items", existing);
                    return Ok(false);
                }
            }
            tx.execute("DELETE FROM menu_items", [])
                .map_err(write_failed)?;
            for item in items {
                insert_row(&tx, item)?;
            }
            tx.commit().map_err(write_failed)?;
            Ok(true)
        })?;

        if !swapped {
            return Ok(None);
        }
        tracing::info!("Replaced local menu with {} items", items.len());
        Ok(Some(items.len()))
    }
}

fn count_rows(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM menu_items", [], |row| row.get(0))
        .map_err(storage_unavailable)
}

/// Insert one row on an already-locked connection or transaction.
pub(crate) fn insert_row(conn: &Connection, item: &NewCatalogItem) -> Result<i64> {
    let price = price_to_sql(item.price)?;
    conn.execute(
        "INSERT INTO menu_items (firebase_id, name, description, price, imageName)
         VALUES (NULLIF(?1, ''), ?2, ?3, ?4, ?5)",
        rusqlite::params![
            item.remote_id,
            item.name,
            item.description,
            price,
            item.image_name
        ],
    )
    .map_err(write_failed)?;
    Ok(conn.last_insert_rowid())
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogItem> {
    let price: f64 = row.get(4)?;
    Ok(CatalogItem {
        local_id: row.get(0)?,
        remote_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        name: row.get(2)?,
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        price: price_from_sql(price).ok_or(rusqlite::Error::InvalidColumnType(
            4,
            "price".into(),
            rusqlite::types::Type::Real,
        ))?,
        image_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

fn price_to_sql(price: Decimal) -> Result<f64> {
    price
        .to_f64()
        .ok_or_else(|| CatalogError::InvalidItem(format!("price {} is not representable", price)))
}

fn price_from_sql(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_SCALE).normalize())
}

fn write_failed(e: rusqlite::Error) -> CatalogError {
    CatalogError::WriteFailed(e.to_string())
}

fn storage_unavailable(e: rusqlite::Error) -> CatalogError {
    CatalogError::StorageUnavailable(e.to_string())
}
