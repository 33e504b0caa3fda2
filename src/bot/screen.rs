//! # Screen Replacement
//!
//! Every prompt replaces the previous one: the old bot message is deleted,
//! the new one is sent, and its id becomes the user's last message id.
//! Deletion failures are swallowed; a send that still fails after retries, or
//! a message id that cannot be recorded, ends the turn with an error.

use rand::Rng;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::errors::ConversationError;
use crate::store::UserStore;

use super::event::InboundEvent;
use super::gateway::{MessageGateway, Outbound};

/// How many attempted deletions are remembered
const LEDGER_CAPACITY: usize = 4096;

/// Messages a delete was already attempted for, successful or not.
///
/// Replaying an event whose delete failed must not try the same delete again.
pub struct DeletionLedger {
    inner: Mutex<LedgerState>,
    capacity: usize,
}

#[derive(Default)]
struct LedgerState {
    seen: HashSet<(i64, i32)>,
    order: VecDeque<(i64, i32)>,
}

impl DeletionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LedgerState::default()),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an attempt, returning false if one was already made
    pub fn claim(&self, chat_id: i64, message_id: i32) -> bool {
        let mut state = self.state();
        let key = (chat_id, message_id);
        if !state.seen.insert(key) {
            return false;
        }
        state.order.push_back(key);
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.state().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeletionLedger {
    fn default() -> Self {
        Self::new(LEDGER_CAPACITY)
    }
}

/// Single-screen presenter for one chat per user
pub struct Screen {
    gateway: Arc<dyn MessageGateway>,
    users: Arc<dyn UserStore>,
    retry: RetryConfig,
    ledger: DeletionLedger,
}

impl Screen {
    pub fn new(gateway: Arc<dyn MessageGateway>, users: Arc<dyn UserStore>, retry: RetryConfig) -> Self {
        Self {
            gateway,
            users,
            retry,
            ledger: DeletionLedger::default(),
        }
    }

    /// Message ids to delete before answering `event`
    pub fn replacement_targets(event: &InboundEvent, last_message_id: Option<i32>) -> Vec<i32> {
        let mut targets = Vec::with_capacity(2);
        if event.is_callback() {
            if let Some(pressed) = event.source_message_id {
                targets.push(pressed);
            }
        }
        if let Some(last) = last_message_id {
            if !targets.contains(&last) {
                targets.push(last);
            }
        }
        targets
    }

    /// Replaces the user's current screen with `outbound`, returning the new message id
    pub async fn present(
        &self,
        event: &InboundEvent,
        last_message_id: Option<i32>,
        outbound: Outbound,
    ) -> Result<i32, ConversationError> {
        let targets = Self::replacement_targets(event, last_message_id);
        self.replace(event.chat_id, event.user_id(), &targets, &outbound)
            .await
    }

    /// Deletes `targets`, sends `outbound` and records it as the last message
    pub async fn replace(
        &self,
        chat_id: i64,
        user_id: i64,
        targets: &[i32],
        outbound: &Outbound,
    ) -> Result<i32, ConversationError> {
        for message_id in targets {
            self.delete_once(chat_id, *message_id).await;
        }

        let message_id = self.send_with_retry(chat_id, outbound).await?;

        if let Err(e) = self.users.set_last_message_id(user_id, Some(message_id)).await {
            error!(user_id, message_id, error = %e, "Failed to record last message id");
            return Err(ConversationError::Storage(format!("{e:#}")));
        }

        debug!(user_id, message_id, "Screen replaced");
        Ok(message_id)
    }

    /// Deletes the user's own text message
    pub async fn discard_user_message(&self, event: &InboundEvent) {
        if event.is_callback() {
            return;
        }
        if let Some(message_id) = event.source_message_id {
            self.delete_once(event.chat_id, message_id).await;
        }
    }

    async fn delete_once(&self, chat_id: i64, message_id: i32) {
        if !self.ledger.claim(chat_id, message_id) {
            debug!(chat_id, message_id, "Delete already attempted, skipping");
            return;
        }
        if let Err(e) = self.gateway.delete_message(chat_id, message_id).await {
            warn!(chat_id, message_id, error = %e, "Failed to delete message");
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.backoff_ms(attempt);
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base / 4)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    async fn send_with_retry(&self, chat_id: i64, outbound: &Outbound) -> Result<i32, ConversationError> {
        let mut attempt = 0;
        loop {
            let result = match outbound {
                Outbound::Prompt(prompt) => self.gateway.send_prompt(chat_id, prompt).await,
                Outbound::Invoice(invoice) => self.gateway.send_invoice(chat_id, invoice).await,
            };
            match result {
                Ok(message_id) => {
                    if attempt > 0 {
                        info!(chat_id, attempt, "Send succeeded after retry");
                    }
                    return Ok(message_id);
                }
                Err(e) if attempt < self.retry.max_retries => {
                    let delay = self.retry_delay(attempt);
                    warn!(chat_id, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Send failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(chat_id, attempts = attempt + 1, error = %e, "Send failed, giving up");
                    return Err(ConversationError::Delivery(format!("{e:#}")));
                }
            }
        }
    }
}
