//! In-memory shopping cart.
//!
//! Lines hold a copy of the catalog item taken when it was first added, so
//! later menu edits or refreshes do not reprice what is already in the cart.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::CatalogItem;

/// One item in the cart with its quantity (always >= 1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    pub item: CatalogItem,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_price(&self) -> Decimal {
        self.item.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add one unit. Repeat adds of the same item bump its quantity.
    ///
    /// Items are matched by remote id when both sides have one, since a
    /// refresh renumbers local rows. Otherwise the local id is used.
    pub fn add(&mut self, item: &CatalogItem) {
        let existing = self
            .lines
            .iter()
            .position(|line| same_item(&line.item, item));
        match existing {
            Some(index) => {
                let line = &mut self.lines[index];
                line.quantity = line.quantity.saturating_add(1);
            }
            None => self.lines.push(CartLine {
                item: item.clone(),
                quantity: 1,
            }),
        }
    }

    /// Set the quantity of an item already in the cart. Zero or less removes it.
    /// Quantities above `u32::MAX` are clamped to `u32::MAX`.
    pub fn set_quantity(&mut self, local_id: i64, quantity: i64) {
        let Some(index) = self.position(local_id) else {
            return;
        };
        if quantity <= 0 {
            self.lines.remove(index);
        } else {
            self.lines[index].quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
    }

    pub fn remove(&mut self, local_id: i64) {
        self.lines.retain(|line| line.item.local_id != local_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total_items(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_price).sum()
    }

    fn position(&self, local_id: i64) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.item.local_id == local_id)
    }
}

fn same_item(a: &CatalogItem, b: &CatalogItem) -> bool {
    if a.has_remote_id() && b.has_remote_id() {
        a.remote_id == b.remote_id
    } else {
        a.local_id == b.local_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCatalogItem;

    fn item(id: i64, name: &str, cents: i64) -> CatalogItem {
        NewCatalogItem::new(name, Decimal::new(cents, 2)).into_item(id)
    }

    #[test]
    fn test_repeat_add_increments_quantity() {
        let mut cart = Cart::new();
        let soup = item(1, "Soup", 450);
        cart.add(&soup);
        cart.add(&soup);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 2);
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new();
        let a = item(1, "A", 1000);
        let b = item(2, "B", 500);
        cart.add(&a);
        cart.add(&a);
        cart.add(&b);
        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.total_price(), Decimal::new(2500, 2));
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let mut cart = Cart::new();
        cart.add(&item(1, "A", 1000));
        cart.add(&item(2, "B", 500));
        cart.set_quantity(1, 0);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].item.name, "B");

        cart.set_quantity(2, -3);
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Decimal::ZERO);
    }

    #[test]
    fn test_set_quantity_unknown_item_is_ignored() {
        let mut cart = Cart::new();
        cart.add(&item(1, "A", 1000));
        cart.set_quantity(99, 5);
        assert_eq!(cart.total_items(), 1);

        cart.set_quantity(1, 4);
        assert_eq!(cart.total_items(), 4);
    }

    #[test]
    fn test_lines_keep_snapshot_price() {
        let mut cart = Cart::new();
        let mut a = item(1, "A", 1000);
        cart.add(&a);

        a.price = Decimal::new(9900, 2);
        cart.add(&a);
        assert_eq!(cart.total_price(), Decimal::new(2000, 2));
    }

    #[test]
    fn test_quantity_clamps_without_overflowing_totals() {
        let mut cart = Cart::new();
        let a = item(1, "A", 100);
        cart.add(&a);
        cart.add(&item(2, "B", 100));
        cart.set_quantity(1, 5_000_000_000);
        cart.set_quantity(2, 5_000_000_000);
        assert_eq!(cart.lines()[0].quantity, u32::MAX);

        cart.add(&a);
        assert_eq!(cart.lines()[0].quantity, u32::MAX);
        assert_eq!(cart.total_items(), 2 * u64::from(u32::MAX));
    }

    #[test]
    fn test_same_dish_after_refresh_shares_a_line() {
        let mut cart = Cart::new();
        let before = NewCatalogItem::new("Soup", Decimal::new(450, 2))
            .with_remote_id("x1")
            .into_item(1);
        let after = NewCatalogItem::new("Soup", Decimal::new(450, 2))
            .with_remote_id("x1")
            .into_item(9);
        cart.add(&before);
        cart.add(&after);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total_items(), 2);

        // Different documents never merge, even if local ids collide.
        let other = NewCatalogItem::new("Bread", Decimal::new(200, 2))
            .with_remote_id("x2")
            .into_item(1);
        cart.add(&other);
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(&item(1, "A", 1000));
        cart.add(&item(2, "B", 500));
        cart.remove(1);
        assert_eq!(cart.total_items(), 1);
        cart.clear();
        assert!(cart.is_empty());
    }
}
