//! In-process implementation of the user and catalog stores.
//!
//! Used when no `DATABASE_URL` is configured and by the test suite. State is
//! lost on restart.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::dialogue::Stage;
use crate::model::{
    NewNotification, NewOrder, NewProduct, Notification, Order, OrderStatus, Product,
    ProductUpdate, ProfileUpdate, UserIdentity, UserProfile,
};
use crate::store::{CatalogStore, UserStore};

#[derive(Default)]
struct MemoryState {
    users: HashMap<i64, UserProfile>,
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, Order>,
    notifications: BTreeMap<i64, Notification>,
    next_product_id: i64,
    next_order_id: i64,
    next_notification_id: i64,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn user_mut(&mut self, user_id: i64) -> Result<&mut UserProfile> {
        match self.users.get_mut(&user_id) {
            Some(user) => Ok(user),
            None => bail!("User {user_id} does not exist"),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overrides a user's registration and activity timestamps
    pub fn set_user_timestamps(
        &self,
        user_id: i64,
        registration_date: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        user.registration_date = registration_date;
        user.last_activity = last_activity;
        Ok(())
    }

    fn filter_users<F>(&self, keep: F) -> Vec<UserProfile>
    where
        F: Fn(&UserProfile) -> bool,
    {
        let state = self.state();
        let mut users: Vec<UserProfile> = state.users.values().filter(|u| keep(u)).cloned().collect();
        users.sort_by_key(|u| u.user_id);
        users
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_user(&self, identity: &UserIdentity) -> Result<UserProfile> {
        let now = Utc::now();
        let mut state = self.state();
        let user = state.users.entry(identity.user_id).or_insert_with(|| {
            info!(user_id = identity.user_id, "Created new user profile");
            UserProfile::new(identity, now)
        });
        // Identity fields are only filled in when still missing
        if user.username.is_none() {
            user.username = identity.username.clone();
        }
        if user.first_name.is_none() {
            user.first_name = identity.first_name.clone();
        }
        if user.last_name.is_none() {
            user.last_name = identity.last_name.clone();
        }
        user.last_activity = now;
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        Ok(self.state().users.get(&user_id).cloned())
    }

    async fn set_stage(&self, user_id: i64, stage: Stage) -> Result<()> {
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        user.stage = stage;
        user.last_activity = Utc::now();
        Ok(())
    }

    async fn set_field(&self, user_id: i64, update: &ProfileUpdate) -> Result<()> {
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        user.apply(update);
        user.last_activity = Utc::now();
        Ok(())
    }

    async fn set_last_message_id(&self, user_id: i64, message_id: Option<i32>) -> Result<()> {
        let mut state = self.state();
        state.user_mut(user_id)?.last_message_id = message_id;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        Ok(self.filter_users(|_| true))
    }

    async fn list_users_by_stage(&self, stage: Stage) -> Result<Vec<UserProfile>> {
        Ok(self.filter_users(|u| u.stage == stage))
    }

    async fn list_active_since(&self, days: i64) -> Result<Vec<UserProfile>> {
        let since = Utc::now() - Duration::days(days);
        Ok(self.filter_users(|u| u.last_activity >= since))
    }

    async fn list_registered_since(&self, days: i64) -> Result<Vec<UserProfile>> {
        let since = Utc::now() - Duration::days(days);
        Ok(self.filter_users(|u| u.registration_date >= since))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>> {
        Ok(self
            .state()
            .products
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect())
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        Ok(self.state().products.get(&product_id).cloned())
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let mut state = self.state();
        let id = MemoryState::next_id(&mut state.next_product_id);
        let created = Product {
            id,
            name: product.name.clone(),
            price: product.price,
            description: product.description.clone(),
            is_active: true,
        };
        state.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update_product(
        &self,
        product_id: i64,
        update: &ProductUpdate,
    ) -> Result<Option<Product>> {
        let mut state = self.state();
        Ok(state.products.get_mut(&product_id).map(|product| {
            update.apply(product);
            product.clone()
        }))
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool> {
        Ok(self.state().products.remove(&product_id).is_some())
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        let mut state = self.state();
        let id = MemoryState::next_id(&mut state.next_order_id);
        let created = Order {
            id,
            user_id: order.user_id,
            total_amount: order.total_amount(),
            status: order.status,
            items: order.items.clone(),
            payment_reference: order.payment_reference.clone(),
            created_at: Utc::now(),
        };
        state.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.state().orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state();
        match state.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = status;
                if let Some(reference) = payment_reference {
                    order.payment_reference = Some(reference.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        Ok(self
            .state()
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.state().orders.values().rev().cloned().collect())
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let mut state = self.state();
        let id = MemoryState::next_id(&mut state.next_notification_id);
        let created = Notification {
            id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            target_audience: notification.target_audience,
            scheduled_at: notification.scheduled_at,
            sent_at: None,
            is_sent: false,
            created_at: Utc::now(),
        };
        state.notifications.insert(id, created.clone());
        Ok(created)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.state().notifications.values().rev().cloned().collect())
    }

    async fn list_due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        Ok(self
            .state()
            .notifications
            .values()
            .filter(|n| n.is_due(now))
            .cloned()
            .collect())
    }

    async fn mark_notification_sent(
        &self,
        notification_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state();
        match state.notifications.get_mut(&notification_id) {
            Some(notification) => {
                notification.is_sent = true;
                notification.sent_at = Some(sent_at);
                Ok(())
            }
            None => bail!("Notification {notification_id} does not exist"),
        }
    }
}
