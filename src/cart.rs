//! Session-scoped shopping cart.
//!
//! A [`Cart`] is an ordered list of [`LineItem`]s keyed by product id. It is
//! never written to the database: the [`CartStore`] keeps one cart per
//! session id in memory and drops it on sign-out or once it has sat idle
//! longer than a session may live.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One product entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub product_id: i64,
    pub name: String,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    pub image: String,
    pub quantity: u32,
}

impl LineItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Product data needed to put something in a cart; the quantity is
/// supplied separately to [`Cart::add_item`].
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub product_id: i64,
    pub name: String,
    pub unit_price: Decimal,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines in first-added-first order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: i64) -> u32 {
        self.items
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }

    /// Adds `quantity` units of `item`. A quantity of zero is ignored; an
    /// existing line for the same product is incremented instead of
    /// duplicated.
    pub fn add_item(&mut self, item: NewLineItem, quantity: u32) {
        if quantity < 1 {
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == item.product_id)
        {
            line.quantity = line.quantity.saturating_add(quantity);
            return;
        }
        self.items.push(LineItem {
            product_id: item.product_id,
            name: item.name,
            unit_price: item.unit_price,
            image: item.image,
            quantity,
        });
    }

    /// Sets the quantity of an existing line. Zero is ignored: removal goes
    /// through [`Cart::remove_item`].
    pub fn update_quantity(&mut self, product_id: i64, new_quantity: u32) {
        if new_quantity < 1 {
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == product_id)
        {
            line.quantity = new_quantity;
        }
    }

    pub fn remove_item(&mut self, product_id: i64) {
        self.items.retain(|line| line.product_id != product_id);
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Takes the lines of `ordered` out of this cart, unit for unit. Lines
    /// added after `ordered` was copied stay behind.
    pub fn deduct(&mut self, ordered: &Cart) {
        for placed in ordered.items() {
            if let Some(line) = self
                .items
                .iter_mut()
                .find(|line| line.product_id == placed.product_id)
            {
                line.quantity = line.quantity.saturating_sub(placed.quantity);
            }
        }
        self.items.retain(|line| line.quantity > 0);
    }

    /// Price breakdown shown on the cart and checkout pages. Shipping is
    /// only charged on a non-empty subtotal.
    #[must_use]
    pub fn summary(&self, shipping_fee: Decimal) -> CartSummary {
        let subtotal = self.total_price();
        let shipping = if subtotal > Decimal::ZERO {
            shipping_fee
        } else {
            Decimal::ZERO
        };
        CartSummary {
            items: self.items.clone(),
            total_items: self.total_items(),
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartSummary {
    pub items: Vec<LineItem>,
    pub total_items: u64,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub shipping: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
}

#[derive(Debug)]
struct StoredCart {
    cart: Cart,
    last_used: Instant,
}

/// In-memory carts keyed by session id.
///
/// Each request locks the map only for the duration of a single cart
/// mutation, so every cart sees its events one at a time. Only adding an
/// item creates an entry.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    carts: Arc<Mutex<HashMap<Uuid, StoredCart>>>,
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh anonymous cart session id. Nothing is stored
    /// until the first item is added.
    #[must_use]
    pub fn issue(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Copy of the session's cart; an unknown session reads as empty.
    #[must_use]
    pub fn snapshot(&self, session_id: Uuid) -> Cart {
        self.lock()
            .get(&session_id)
            .map(|stored| stored.cart.clone())
            .unwrap_or_default()
    }

    /// Runs `f` against the session's cart, creating it on first use.
    pub fn update<R>(&self, session_id: Uuid, f: impl FnOnce(&mut Cart) -> R) -> R {
        let mut carts = self.lock();
        let stored = carts.entry(session_id).or_insert_with(|| StoredCart {
            cart: Cart::new(),
            last_used: Instant::now(),
        });
        stored.last_used = Instant::now();
        f(&mut stored.cart)
    }

    /// Runs `f` against the session's cart if it has one. A cart left empty
    /// is dropped.
    pub fn update_existing<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut Cart) -> R,
    ) -> Option<R> {
        let mut carts = self.lock();
        let stored = carts.get_mut(&session_id)?;
        stored.last_used = Instant::now();
        let out = f(&mut stored.cart);
        if stored.cart.is_empty() {
            carts.remove(&session_id);
        }
        Some(out)
    }

    /// Forgets the session's cart entirely.
    pub fn discard(&self, session_id: Uuid) -> bool {
        self.lock().remove(&session_id).is_some()
    }

    /// Drops carts untouched for `max_idle` or longer. Returns how many
    /// were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut carts = self.lock();
        let before = carts.len();
        carts.retain(|_, stored| stored.last_used.elapsed() < max_idle);
        before - carts.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, StoredCart>> {
        self.carts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn product(id: i64, price: Decimal) -> NewLineItem {
        NewLineItem {
            product_id: id,
            name: format!("Product {id}"),
            unit_price: price,
            image: format!("https://img.example/{id}.jpg"),
        }
    }

    #[test]
    fn repeated_adds_merge_into_one_line() {
        let mut cart = Cart::new();
        cart.add_item(product(7, d("10.00")), 2);
        cart.add_item(product(7, d("10.00")), 3);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.quantity_of(7), 5);
        assert_eq!(cart.total_price(), d("50.00"));
    }

    #[test]
    fn add_with_zero_quantity_is_ignored() {
        let mut cart = Cart::new();
        cart.add_item(product(1, d("3.50")), 0);
        assert!(cart.is_empty());

        cart.add_item(product(1, d("3.50")), 1);
        cart.add_item(product(1, d("3.50")), 0);
        assert_eq!(cart.quantity_of(1), 1);
    }

    #[test]
    fn lines_keep_insertion_order() {
        let mut cart = Cart::new();
        cart.add_item(product(3, d("1")), 1);
        cart.add_item(product(1, d("1")), 1);
        cart.add_item(product(2, d("1")), 1);
        cart.add_item(product(3, d("1")), 4);

        let ids: Vec<i64> = cart.items().iter().map(|l| l.product_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn update_quantity_ignores_zero_and_sets_positive() {
        let mut cart = Cart::new();
        cart.add_item(product(4, d("2.25")), 2);
        let before = cart.clone();

        cart.update_quantity(4, 0);
        assert_eq!(cart, before);

        cart.update_quantity(4, 3);
        assert_eq!(cart.quantity_of(4), 3);
    }

    #[test]
    fn update_quantity_on_missing_product_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(product(4, d("2.25")), 2);
        let before = cart.clone();

        cart.update_quantity(99, 5);
        assert_eq!(cart, before);
    }

    #[test]
    fn remove_missing_product_leaves_cart_unchanged() {
        let mut cart = Cart::new();
        cart.add_item(product(5, d("9.99")), 1);
        let before = cart.clone();

        cart.remove_item(42);
        assert_eq!(cart, before);

        cart.remove_item(5);
        cart.remove_item(5);
        assert!(cart.is_empty());
    }

    #[test]
    fn totals_sum_over_lines() {
        let mut cart = Cart::new();
        cart.add_item(product(1, d("89.99")), 1);
        cart.add_item(product(2, d("199.99")), 2);

        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.total_price(), d("489.97"));
    }

    #[test]
    fn clear_resets_item_count() {
        let mut cart = Cart::new();
        cart.add_item(product(1, d("5")), 4);
        cart.clear();

        assert_eq!(cart.total_items(), 0);
        assert_eq!(cart.total_price(), Decimal::ZERO);
    }

    #[test]
    fn summary_charges_shipping_only_when_not_empty() {
        let mut cart = Cart::new();
        let empty = cart.summary(d("4.99"));
        assert_eq!(empty.shipping, Decimal::ZERO);
        assert_eq!(empty.total, Decimal::ZERO);

        cart.add_item(product(1, d("49.99")), 2);
        let summary = cart.summary(d("4.99"));
        assert_eq!(summary.subtotal, d("99.98"));
        assert_eq!(summary.shipping, d("4.99"));
        assert_eq!(summary.total, d("104.97"));
        assert_eq!(summary.total_items, 2);
    }

    #[test]
    fn store_isolates_sessions() {
        let store = CartStore::new();
        let a = store.issue();
        let b = store.issue();

        store.update(a, |cart| cart.add_item(product(1, d("1")), 2));
        assert_eq!(store.snapshot(a).total_items(), 2);
        assert!(store.snapshot(b).is_empty());

        assert!(store.discard(a));
        assert!(store.snapshot(a).is_empty());
        assert!(!store.discard(a));
    }

    #[test]
    fn store_creates_cart_on_first_use() {
        let store = CartStore::new();
        let session = Uuid::new_v4();
        let count = store.update(session, |cart| {
            cart.add_item(product(8, d("12")), 1);
            cart.total_items()
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn deduct_keeps_lines_added_after_the_copy() {
        let mut cart = Cart::new();
        cart.add_item(product(1, d("10")), 2);
        let ordered = cart.clone();

        cart.add_item(product(1, d("10")), 1);
        cart.add_item(product(2, d("4")), 3);
        cart.deduct(&ordered);

        assert_eq!(cart.quantity_of(1), 1);
        assert_eq!(cart.quantity_of(2), 3);
        assert_eq!(cart.items().len(), 2);
    }

    #[test]
    fn deduct_of_whole_cart_empties_it() {
        let mut cart = Cart::new();
        cart.add_item(product(1, d("10")), 2);
        cart.add_item(product(2, d("4")), 1);
        let ordered = cart.clone();

        cart.update_quantity(1, 1);
        cart.deduct(&ordered);
        assert!(cart.is_empty());
    }

    #[test]
    fn edits_on_unknown_sessions_store_nothing() {
        let store = CartStore::new();
        for _ in 0..100 {
            let session = Uuid::new_v4();
            assert_eq!(store.update_existing(session, |cart| cart.remove_item(1)), None);
            assert_eq!(store.update_existing(session, Cart::clear), None);
        }
        let _ = store.issue();
        assert!(store.is_empty());
    }

    #[test]
    fn emptied_cart_is_dropped_from_store() {
        let store = CartStore::new();
        let session = store.issue();
        store.update(session, |cart| cart.add_item(product(1, d("1")), 1));
        assert_eq!(store.len(), 1);

        store.update_existing(session, |cart| cart.remove_item(1));
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_drops_idle_carts() {
        let store = CartStore::new();
        store.update(Uuid::new_v4(), |cart| cart.add_item(product(1, d("1")), 1));
        store.update(Uuid::new_v4(), |cart| cart.add_item(product(2, d("1")), 1));

        assert_eq!(store.sweep_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.sweep_idle(Duration::ZERO), 2);
        assert!(store.is_empty());
    }
}
