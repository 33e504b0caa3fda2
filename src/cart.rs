//! # Cart Module
//!
//! Session carts keyed by user id, plus checkout: turning a cart snapshot into
//! a pending order.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::model::{Cart, Order, Product};
use crate::store::{CartStore, CatalogStore};

struct CartSession {
    cart: Cart,
    touched: Instant,
}

/// In-memory carts that expire after a period without activity.
///
/// An expired cart reads as empty; [`CartStore::purge_expired`] reclaims the memory.
pub struct SessionCarts {
    sessions: Mutex<HashMap<i64, CartSession>>,
    ttl: Duration,
}

impl SessionCarts {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i64, CartSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, session: &CartSession, now: Instant) -> bool {
        now.duration_since(session.touched) >= self.ttl
    }

    /// Live session for a user, replacing an expired one with an empty cart
    fn with_session<T>(&self, user_id: i64, f: impl FnOnce(&mut Cart) -> T) -> T {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let session = sessions.entry(user_id).or_insert_with(|| CartSession {
            cart: Cart::default(),
            touched: now,
        });
        if self.is_expired(session, now) {
            debug!(user_id, "Cart expired, starting a new one");
            session.cart = Cart::default();
        }
        session.touched = now;
        f(&mut session.cart)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CartStore for SessionCarts {
    async fn add_item(&self, user_id: i64, product: &Product, quantity: u32) -> Result<Cart> {
        Ok(self.with_session(user_id, |cart| {
            cart.add(product, quantity);
            cart.clone()
        }))
    }

    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<Cart> {
        Ok(self.with_session(user_id, |cart| {
            cart.remove(product_id);
            cart.clone()
        }))
    }

    async fn get_cart(&self, user_id: i64) -> Result<Cart> {
        let now = Instant::now();
        let sessions = self.sessions();
        Ok(sessions
            .get(&user_id)
            .filter(|session| !self.is_expired(session, now))
            .map(|session| session.cart.clone())
            .unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: i64) -> Result<()> {
        self.sessions().remove(&user_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now) && !session.cart.is_empty());
        Ok(before - sessions.len())
    }
}

/// Freezes the user's cart into a pending order.
///
/// Returns `None` for an empty cart. If the order cannot be created the cart is left as it was.
pub async fn checkout(
    carts: &dyn CartStore,
    catalog: &dyn CatalogStore,
    user_id: i64,
) -> Result<Option<Order>> {
    let order = carts.checkout(user_id, catalog).await?;
    match &order {
        Some(order) => {
            info!(user_id, order_id = order.id, total = order.total_amount, "Created order from cart")
        }
        None => debug!(user_id, "Checkout requested with an empty cart"),
    }
    Ok(order)
}
