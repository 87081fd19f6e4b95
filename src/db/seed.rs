use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::NewCatalogItem;

/// Sample rows written on first launch so the menu is never empty.
pub fn builtin_catalog() -> Vec<NewCatalogItem> {
    [
        ("Margherita Pizza", "Tomato, mozzarella and fresh basil.", 1199, "pizza"),
        ("Chicken Burrito", "Grilled chicken, rice, beans and salsa.", 999, "burrito"),
        ("Caesar Salad", "Romaine, parmesan, croutons and Caesar dressing.", 849, "salad"),
        ("Pad Thai", "Rice noodles with tamarind, peanuts and lime.", 1249, "padthai"),
    ]
    .into_iter()
    .map(|(name, description, cents, image)| {
        NewCatalogItem::new(name, Decimal::new(cents, 2))
            .with_description(description)
            .with_image(image)
    })
    .collect()
}

/// Insert the built-in catalog if the table has no rows at all.
///
/// Returns the number of rows written (zero when seeding was skipped).
pub fn seed_if_empty(conn: &mut Connection) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM menu_items", [], |row| row.get(0))?;
    if existing > 0 {
        tracing::debug!("Menu already has {} rows, skipping seed", existing);
        return Ok(0);
    }

    let items = builtin_catalog();
    let tx = conn.transaction()?;
    for item in &items {
        super::insert_row(&tx, item)?;
    }
    tx.commit()?;

    tracing::info!("Seeded menu with {} built-in items", items.len());
    Ok(items.len())
}
