//! Storage seams used by the conversation engine, the scheduler and the admin API.
//!
//! Implemented by [`crate::db::PgStore`] (Postgres) and
//! [`crate::memory_store::MemoryStore`] (in-process).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dialogue::Stage;
use crate::model::{
    Cart, NewNotification, NewOrder, NewProduct, Notification, Order, OrderStatus, Product,
    ProductUpdate, ProfileUpdate, UserIdentity, UserProfile,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the profile on first contact and refreshes `last_activity` on later calls.
    /// Identity fields already stored are never overwritten.
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserProfile>;

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>>;

    async fn set_stage(&self, user_id: i64, stage: Stage) -> Result<()>;

    async fn set_field(&self, user_id: i64, update: &ProfileUpdate) -> Result<()>;

    async fn set_last_message_id(&self, user_id: i64, message_id: Option<i32>) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<UserProfile>>;

    async fn list_users_by_stage(&self, stage: Stage) -> Result<Vec<UserProfile>>;

    /// Users whose last activity is within the given number of days
    async fn list_active_since(&self, days: i64) -> Result<Vec<UserProfile>>;

    /// Users who registered within the given number of days
    async fn list_registered_since(&self, days: i64) -> Result<Vec<UserProfile>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>>;

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>>;

    async fn create_product(&self, product: &NewProduct) -> Result<Product>;

    async fn update_product(&self, product_id: i64, update: &ProductUpdate)
        -> Result<Option<Product>>;

    async fn delete_product(&self, product_id: i64) -> Result<bool>;

    async fn create_order(&self, order: &NewOrder) -> Result<Order>;

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>>;

    /// Moves a pending order to `status`. Returns false if the order is missing or no longer pending.
    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<bool>;

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>>;

    /// All orders, newest first
    async fn list_orders(&self) -> Result<Vec<Order>>;

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification>;

    async fn list_notifications(&self) -> Result<Vec<Notification>>;

    /// Unsent notifications whose scheduled time is absent or not after `now`
    async fn list_due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>>;

    async fn mark_notification_sent(&self, notification_id: i64, sent_at: DateTime<Utc>)
        -> Result<()>;
}

/// Per-user shopping carts
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Adds a product, merging quantities with an existing line
    async fn add_item(&self, user_id: i64, product: &Product, quantity: u32) -> Result<Cart>;

    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<Cart>;

    async fn get_cart(&self, user_id: i64) -> Result<Cart>;

    async fn clear_cart(&self, user_id: i64) -> Result<()>;

    /// Freezes the cart into a pending order and empties it. Returns `None` for an empty cart.
    ///
    /// The cart is cleared only once the order exists, so a failed insert leaves it intact.
    /// Stores that keep carts next to orders override this with a single transaction.
    async fn checkout(&self, user_id: i64, catalog: &dyn CatalogStore) -> Result<Option<Order>> {
        let cart = self.get_cart(user_id).await?;
        if cart.is_empty() {
            return Ok(None);
        }
        let order = catalog.create_order(&NewOrder::from_cart(user_id, &cart)).await?;
        self.clear_cart(user_id).await?;
        Ok(Some(order))
    }

    /// Drops carts past their lifetime, returning how many were removed
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
