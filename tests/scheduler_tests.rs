mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{identity, RecordingGateway};
use storefront_bot::bot::ui_builder::broadcast_prompt;
use storefront_bot::dialogue::Stage;
use storefront_bot::memory_store::MemoryStore;
use storefront_bot::model::{
    Audience, NewNotification, NewOrder, NewProduct, Notification, Order, OrderStatus, Product,
    ProductUpdate,
};
use storefront_bot::scheduler::{BroadcastReport, BroadcastScheduler};
use storefront_bot::store::{CatalogStore, UserStore};

fn scheduler(store: &Arc<MemoryStore>, gateway: &Arc<RecordingGateway>) -> BroadcastScheduler {
    BroadcastScheduler::new(
        store.clone(),
        store.clone(),
        gateway.clone(),
        Duration::from_secs(60),
        Duration::ZERO,
    )
}

fn notification(audience: Audience) -> NewNotification {
    NewNotification {
        title: "Sale".into(),
        message: "Everything -20%".into(),
        target_audience: audience,
        scheduled_at: None,
    }
}

async fn users(store: &MemoryStore, ids: &[i64]) -> Result<()> {
    for id in ids {
        store.upsert_user(&identity(*id)).await?;
    }
    Ok(())
}

fn recipients(gateway: &RecordingGateway) -> Vec<i64> {
    let mut chats: Vec<i64> = gateway.sent().iter().map(|m| m.chat_id).collect();
    chats.sort_unstable();
    chats
}

#[tokio::test]
async fn test_broadcast_reaches_everyone_once() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1, 2, 3]).await?;
    let created = store.create_notification(&notification(Audience::All)).await?;

    let scheduler = scheduler(&store, &gateway);
    let report = scheduler.run_once(Utc::now()).await?;
    assert_eq!(
        report,
        BroadcastReport {
            notifications: 1,
            delivered: 3,
            failed: 0
        }
    );
    assert_eq!(recipients(&gateway), vec![1, 2, 3]);
    assert_eq!(
        gateway.sent()[0].prompt,
        broadcast_prompt("Sale", "Everything -20%", None)
    );

    let stored = store.list_notifications().await?;
    assert!(stored[0].is_sent);
    assert!(stored[0].sent_at.is_some());
    assert_eq!(stored[0].id, created.id);

    // Nothing left to send on the next tick
    let report = scheduler.run_once(Utc::now()).await?;
    assert_eq!(report, BroadcastReport::default());
    assert_eq!(gateway.sent().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_recipient_does_not_stop_broadcast() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1, 2, 3]).await?;
    gateway.fail_chat(2);
    store.create_notification(&notification(Audience::All)).await?;

    let report = scheduler(&store, &gateway).run_once(Utc::now()).await?;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.notifications, 1);
    assert_eq!(recipients(&gateway), vec![1, 3]);
    assert!(store.list_notifications().await?[0].is_sent);
    Ok(())
}

#[tokio::test]
async fn test_future_notifications_wait() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1]).await?;
    let at = Utc::now() + ChronoDuration::hours(1);
    store
        .create_notification(&NewNotification {
            scheduled_at: Some(at),
            ..notification(Audience::All)
        })
        .await?;

    let scheduler = scheduler(&store, &gateway);
    assert_eq!(scheduler.run_once(Utc::now()).await?.notifications, 0);
    assert!(gateway.sent().is_empty());

    let report = scheduler.run_once(at + ChronoDuration::seconds(1)).await?;
    assert_eq!(report.notifications, 1);
    assert_eq!(recipients(&gateway), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_stage_audience() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1, 2, 3]).await?;
    store.set_stage(2, Stage::Registered).await?;
    store
        .create_notification(&notification(Audience::Stage(Stage::Registered)))
        .await?;

    scheduler(&store, &gateway).run_once(Utc::now()).await?;
    assert_eq!(recipients(&gateway), vec![2]);
    Ok(())
}

#[tokio::test]
async fn test_active_and_new_audiences() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1, 2, 3]).await?;

    let now = Utc::now();
    // Registered long ago but active last week
    store.set_user_timestamps(1, now - ChronoDuration::days(90), now - ChronoDuration::days(7))?;
    // Registered and last seen two months ago
    store.set_user_timestamps(2, now - ChronoDuration::days(90), now - ChronoDuration::days(60))?;
    // User 3 joined just now

    store.create_notification(&notification(Audience::Active)).await?;
    scheduler(&store, &gateway).run_once(now).await?;
    assert_eq!(recipients(&gateway), vec![1, 3]);

    let gateway = RecordingGateway::new();
    store.create_notification(&notification(Audience::New)).await?;
    scheduler(&store, &gateway).run_once(now).await?;
    assert_eq!(recipients(&gateway), vec![3]);
    Ok(())
}

/// Catalog whose first `failures` sent-flag writes fail
struct FlakyMarks {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
}

#[async_trait]
impl CatalogStore for FlakyMarks {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>> {
        self.inner.list_products(include_inactive).await
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        self.inner.get_product(product_id).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        self.inner.create_product(product).await
    }

    async fn update_product(&self, product_id: i64, update: &ProductUpdate) -> Result<Option<Product>> {
        self.inner.update_product(product_id, update).await
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool> {
        self.inner.delete_product(product_id).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        self.inner.create_order(order).await
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        self.inner.get_order(order_id).await
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<bool> {
        self.inner.update_order_status(order_id, status, payment_reference).await
    }

    async fn list_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        self.inner.list_orders_by_user(user_id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.inner.list_orders().await
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.inner.create_notification(notification).await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.inner.list_notifications().await
    }

    async fn list_due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        self.inner.list_due_notifications(now).await
    }

    async fn mark_notification_sent(&self, notification_id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("notifications table locked"));
        }
        self.inner.mark_notification_sent(notification_id, sent_at).await
    }
}

#[tokio::test]
async fn test_failed_sent_flag_does_not_resend_broadcast() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = RecordingGateway::new();
    users(&store, &[1, 2]).await?;
    store.create_notification(&notification(Audience::All)).await?;
    store.create_notification(&notification(Audience::All)).await?;

    let catalog = Arc::new(FlakyMarks {
        inner: store.clone(),
        failures: AtomicUsize::new(1),
    });
    let scheduler = BroadcastScheduler::new(
        store.clone(),
        catalog,
        gateway.clone(),
        Duration::from_secs(60),
        Duration::ZERO,
    );

    // The first flag write fails; the tick still handles the second notification
    let report = scheduler.run_once(Utc::now()).await?;
    assert_eq!(report.notifications, 1);
    assert_eq!(report.delivered, 4);
    assert_eq!(gateway.sent().len(), 4);
    let pending = store.list_due_notifications(Utc::now()).await?;
    assert_eq!(pending.len(), 1);

    // Next tick only stores the flag
    let report = scheduler.run_once(Utc::now()).await?;
    assert_eq!(report.notifications, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(gateway.sent().len(), 4);
    assert!(store.list_due_notifications(Utc::now()).await?.is_empty());
    Ok(())
}
