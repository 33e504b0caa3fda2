//! # Broadcast Scheduler
//!
//! Periodically fans due notifications out to their audience. Sends are
//! sequential with a small delay between them; a failed recipient is skipped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bot::gateway::MessageGateway;
use crate::bot::ui_builder::broadcast_prompt;
use crate::model::{Audience, Notification, UserProfile};
use crate::store::{CatalogStore, UserStore};

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Notifications marked as sent
    pub notifications: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct BroadcastScheduler {
    users: Arc<dyn UserStore>,
    catalog: Arc<dyn CatalogStore>,
    gateway: Arc<dyn MessageGateway>,
    interval: Duration,
    send_delay: Duration,
    /// Delivered notifications whose sent flag could not be stored yet
    unmarked: Mutex<HashSet<i64>>,
}

impl BroadcastScheduler {
    pub fn new(
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogStore>,
        gateway: Arc<dyn MessageGateway>,
        interval: Duration,
        send_delay: Duration,
    ) -> Self {
        Self {
            users,
            catalog,
            gateway,
            interval,
            send_delay,
            unmarked: Mutex::new(HashSet::new()),
        }
    }

    fn unmarked(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.unmarked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores the sent flag. On failure the id is remembered so the audience is not messaged twice.
    async fn mark_sent(&self, notification_id: i64) -> bool {
        match self
            .catalog
            .mark_notification_sent(notification_id, Utc::now())
            .await
        {
            Ok(()) => {
                self.unmarked().remove(&notification_id);
                true
            }
            Err(e) => {
                error!(notification_id, error = %e, "Could not mark broadcast as sent");
                self.unmarked().insert(notification_id);
                false
            }
        }
    }

    /// Polls forever; errors are logged and retried on the next tick
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Broadcast scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(report) if report.notifications > 0 => {
                    info!(
                        notifications = report.notifications,
                        delivered = report.delivered,
                        failed = report.failed,
                        "Broadcast tick finished"
                    );
                }
                Ok(_) => debug!("No broadcasts due"),
                Err(e) => error!(error = %e, "Broadcast tick failed"),
            }
        }
    }

    /// Sends every notification due at `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<BroadcastReport> {
        let due = self.catalog.list_due_notifications(now).await?;
        let mut report = BroadcastReport::default();

        for notification in due {
            if self.unmarked().contains(&notification.id) {
                debug!(notification_id = notification.id, "Broadcast already delivered, retrying sent flag");
                if self.mark_sent(notification.id).await {
                    report.notifications += 1;
                }
                continue;
            }

            let recipients = match self.resolve_audience(notification.target_audience).await {
                Ok(recipients) => recipients,
                Err(e) => {
                    warn!(
                        notification_id = notification.id,
                        audience = %notification.target_audience,
                        error = %e,
                        "Could not resolve audience, leaving notification pending"
                    );
                    continue;
                }
            };

            let (delivered, failed) = self.deliver(&notification, &recipients).await;
            report.delivered += delivered;
            report.failed += failed;

            if !self.mark_sent(notification.id).await {
                continue;
            }
            report.notifications += 1;
            info!(
                notification_id = notification.id,
                recipients = recipients.len(),
                delivered,
                failed,
                "Broadcast sent"
            );
        }

        Ok(report)
    }

    async fn resolve_audience(&self, audience: Audience) -> Result<Vec<UserProfile>> {
        match audience {
            Audience::All => self.users.list_users().await,
            Audience::Active => {
                self.users
                    .list_active_since(Audience::ACTIVE_WITHIN_DAYS)
                    .await
            }
            Audience::New => {
                self.users
                    .list_registered_since(Audience::NEW_WITHIN_DAYS)
                    .await
            }
            Audience::Stage(stage) => self.users.list_users_by_stage(stage).await,
        }
    }

    async fn deliver(&self, notification: &Notification, recipients: &[UserProfile]) -> (usize, usize) {
        let prompt = broadcast_prompt(&notification.title, &notification.message, None);
        let mut delivered = 0;
        let mut failed = 0;

        for (i, user) in recipients.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            // Private chats share their id with the user
            match self.gateway.send_prompt(user.user_id, &prompt).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        notification_id = notification.id,
                        user_id = user.user_id,
                        error = %e,
                        "Failed to deliver broadcast"
                    );
                }
            }
        }

        (delivered, failed)
    }
}
