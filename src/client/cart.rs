use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::storage::KeyValueStorage;

const CART_KEY: &str = "cart";
const VENDOR_KEY: &str = "cart_vendor";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CartItem {
    pub menu_item_id: i32,
    pub name: String,
    pub price: f32,
    pub quantity: i32,
    pub image: Option<String>,
}

/// The vendor whose items currently fill the cart. A checkout spans
/// exactly one vendor, so the cart tracks it alongside the lines.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VendorRef {
    pub id: i32,
    pub name: String,
}

/// An item being added, carrying the vendor it comes from.
#[derive(Clone, Debug)]
pub struct NewCartItem {
    pub menu_item_id: i32,
    pub name: String,
    pub price: f32,
    pub image: Option<String>,
    pub vendor_id: i32,
    pub vendor_name: String,
}

#[derive(Error, Debug, PartialEq)]
#[error("Cart contains items from {vendor_name}")]
pub struct VendorConflict {
    /// Name of the vendor already in the cart, for the confirmation prompt.
    pub vendor_name: String,
}

/// Single-vendor shopping cart persisted on every mutation.
pub struct CartStore<S> {
    storage: S,
    items: Vec<CartItem>,
    vendor: Option<VendorRef>,
}

impl<S: KeyValueStorage> CartStore<S> {
    /// Restores the saved cart; unreadable saved state degrades to an
    /// empty cart rather than an error.
    pub fn load(storage: S) -> Self {
        let items = storage
            .get(CART_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let vendor = storage
            .get(VENDOR_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok());

        Self {
            storage,
            items,
            vendor,
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn vendor(&self) -> Option<&VendorRef> {
        self.vendor.as_ref()
    }

    /// True when the cart already holds another vendor's items, i.e. the
    /// client should confirm before calling [`replace_with`].
    ///
    /// [`replace_with`]: CartStore::replace_with
    pub fn conflicts_with(&self, vendor_id: i32) -> bool {
        !self.items.is_empty()
            && self
                .vendor
                .as_ref()
                .is_some_and(|vendor| vendor.id != vendor_id)
    }

    /// Adds one unit of the item. Adding an item already in the cart
    /// increments its quantity. Refuses without mutating when the item
    /// comes from a different vendor than the current cart contents.
    pub fn add_item(&mut self, item: NewCartItem) -> Result<(), VendorConflict> {
        if self.conflicts_with(item.vendor_id) {
            return Err(VendorConflict {
                vendor_name: self
                    .vendor
                    .as_ref()
                    .map(|vendor| vendor.name.clone())
                    .unwrap_or_default(),
            });
        }

        self.vendor = Some(VendorRef {
            id: item.vendor_id,
            name: item.vendor_name.clone(),
        });

        match self
            .items
            .iter_mut()
            .find(|line| line.menu_item_id == item.menu_item_id)
        {
            Some(line) => line.quantity += 1,
            None => self.items.push(CartItem {
                menu_item_id: item.menu_item_id,
                name: item.name,
                price: item.price,
                quantity: 1,
                image: item.image,
            }),
        }

        self.persist();
        Ok(())
    }

    /// Drops the current cart and starts over with the given item; the
    /// explicit path for resolving a [`VendorConflict`].
    pub fn replace_with(&mut self, item: NewCartItem) {
        self.items.clear();
        self.vendor = None;
        // Cannot conflict with an empty cart.
        let _ = self.add_item(item);
    }

    /// Removes a line entirely; the vendor context resets once the last
    /// line is gone.
    pub fn remove_item(&mut self, menu_item_id: i32) {
        self.items.retain(|line| line.menu_item_id != menu_item_id);
        if self.items.is_empty() {
            self.vendor = None;
        }
        self.persist();
    }

    /// Sets a line's quantity; values below 1 are ignored.
    pub fn update_quantity(&mut self, menu_item_id: i32, quantity: i32) {
        if quantity < 1 {
            return;
        }

        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.menu_item_id == menu_item_id)
        {
            line.quantity = quantity;
            self.persist();
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.vendor = None;
        self.persist();
    }

    pub fn total_items(&self) -> i32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    pub fn total_amount(&self) -> f32 {
        self.items
            .iter()
            .map(|line| line.price * line.quantity as f32)
            .sum()
    }

    fn persist(&mut self) {
        match serde_json::to_string(&self.items) {
            Ok(raw) => self.storage.set(CART_KEY, &raw),
            Err(_) => self.storage.remove(CART_KEY),
        }

        match &self.vendor {
            Some(vendor) => match serde_json::to_string(vendor) {
                Ok(raw) => self.storage.set(VENDOR_KEY, &raw),
                Err(_) => self.storage.remove(VENDOR_KEY),
            },
            None => self.storage.remove(VENDOR_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    fn item_from(vendor_id: i32, vendor_name: &str, menu_item_id: i32, price: f32) -> NewCartItem {
        NewCartItem {
            menu_item_id,
            name: format!("Item {menu_item_id}"),
            price,
            image: None,
            vendor_id,
            vendor_name: vendor_name.to_string(),
        }
    }

    #[test]
    fn adding_same_item_increments_quantity() {
        let mut cart = CartStore::load(MemoryStorage::new());

        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.total_items(), 2);
        assert_eq!(cart.total_amount(), 100.0);
    }

    #[test]
    fn items_from_another_vendor_are_refused() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();

        let err = cart.add_item(item_from(2, "Deli", 20, 30.0)).unwrap_err();
        assert_eq!(err.vendor_name, "Cafe");

        // Refusal leaves the cart untouched.
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.vendor().unwrap().id, 1);
    }

    #[test]
    fn replace_with_switches_vendor() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();

        cart.replace_with(item_from(2, "Deli", 20, 30.0));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].menu_item_id, 20);
        assert_eq!(cart.vendor().unwrap().id, 2);
    }

    #[test]
    fn removing_last_item_resets_vendor() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();
        cart.add_item(item_from(1, "Cafe", 11, 25.0)).unwrap();

        cart.remove_item(10);
        assert!(cart.vendor().is_some());

        cart.remove_item(11);
        assert!(cart.vendor().is_none());
        assert!(!cart.conflicts_with(2));
    }

    #[test]
    fn quantities_below_one_are_ignored() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();

        cart.update_quantity(10, 0);
        assert_eq!(cart.items()[0].quantity, 1);

        cart.update_quantity(10, 5);
        assert_eq!(cart.items()[0].quantity, 5);
        assert_eq!(cart.total_amount(), 250.0);
    }

    #[test]
    fn cart_survives_reload() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();
        cart.update_quantity(10, 3);

        let reloaded = CartStore::load(cart.storage);
        assert_eq!(reloaded.items().len(), 1);
        assert_eq!(reloaded.items()[0].quantity, 3);
        assert_eq!(reloaded.vendor().unwrap().name, "Cafe");
    }

    #[test]
    fn corrupt_saved_state_degrades_to_empty_cart() {
        let mut storage = MemoryStorage::new();
        storage.set(CART_KEY, "not json");
        storage.set(VENDOR_KEY, "{broken");

        let cart = CartStore::load(storage);
        assert!(cart.items().is_empty());
        assert!(cart.vendor().is_none());
    }

    #[test]
    fn clear_empties_cart_and_storage() {
        let mut cart = CartStore::load(MemoryStorage::new());
        cart.add_item(item_from(1, "Cafe", 10, 50.0)).unwrap();
        cart.clear();

        assert_eq!(cart.total_items(), 0);

        let reloaded = CartStore::load(cart.storage);
        assert!(reloaded.items().is_empty());
        assert!(reloaded.vendor().is_none());
    }
}
