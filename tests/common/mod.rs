//! Shared fixtures for the engine and scheduler tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storefront_bot::bot::gateway::{MessageGateway, Prompt};
use storefront_bot::bot::{ConversationEngine, EngineSettings, InboundEvent};
use storefront_bot::cart::SessionCarts;
use storefront_bot::config::{Material, RetryConfig};
use storefront_bot::memory_store::MemoryStore;
use storefront_bot::model::{NewProduct, Product, UserIdentity, UserProfile};
use storefront_bot::payments::Invoice;
use storefront_bot::store::{CatalogStore, UserStore};

pub const ADMIN_ID: i64 = 900;

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub prompt: Prompt,
}

/// Gateway fake that records every call
#[derive(Default)]
pub struct RecordingGateway {
    next_id: AtomicI32,
    pub sent: Mutex<Vec<SentMessage>>,
    pub invoices: Mutex<Vec<(i64, Invoice)>>,
    /// Successful deletions
    pub deleted: Mutex<Vec<(i64, i32)>>,
    /// Every delete call, failed or not
    pub delete_attempts: Mutex<Vec<(i64, i32)>>,
    pub fail_deletes: AtomicBool,
    pub failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(1000),
            ..Default::default()
        })
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Prompt {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|m| m.prompt.clone())
            .expect("no prompt sent")
    }

    pub fn last_message_id(&self) -> i32 {
        self.sent.lock().unwrap().last().expect("no prompt sent").message_id
    }

    pub fn delete_attempts(&self) -> Vec<(i64, i32)> {
        self.delete_attempts.lock().unwrap().clone()
    }

    pub fn invoices(&self) -> Vec<(i64, Invoice)> {
        self.invoices.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send_prompt(&self, chat_id: i64, prompt: &Prompt) -> Result<i32> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            bail!("chat {chat_id} is unreachable");
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            prompt: prompt.clone(),
        });
        Ok(message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.delete_attempts.lock().unwrap().push((chat_id, message_id));
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("message can't be deleted");
        }
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<i32> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.invoices.lock().unwrap().push((chat_id, invoice.clone()));
        Ok(message_id)
    }
}

pub struct Harness {
    pub engine: ConversationEngine,
    pub store: Arc<MemoryStore>,
    pub carts: Arc<SessionCarts>,
    pub gateway: Arc<RecordingGateway>,
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        admin_id: Some(ADMIN_ID),
        materials: vec![Material {
            title: "Starter guide".into(),
            url: "https://example.com/guide".into(),
        }],
        retry: RetryConfig::immediate(),
        ..EngineSettings::default()
    }
}

pub fn harness() -> Harness {
    harness_with(settings())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let carts = Arc::new(SessionCarts::new(Duration::from_secs(3600)));
    let gateway = RecordingGateway::new();
    let engine = ConversationEngine::new(
        store.clone(),
        store.clone(),
        carts.clone(),
        gateway.clone(),
        settings,
    );
    Harness {
        engine,
        store,
        carts,
        gateway,
    }
}

pub fn identity(user_id: i64) -> UserIdentity {
    UserIdentity {
        user_id,
        username: Some(format!("user{user_id}")),
        first_name: Some("Alex".into()),
        last_name: None,
    }
}

impl Harness {
    /// Sends text as user `user_id`; message ids of user messages start at 1
    pub async fn text(&self, user_id: i64, text: &str, message_id: i32) {
        let event = InboundEvent::text(identity(user_id), user_id, text, message_id)
            .with_language(Some("en".into()));
        self.engine.handle(event).await.expect("text handled");
    }

    /// Presses a button on the user's current screen
    pub async fn press(&self, user_id: i64, data: &str) {
        let message_id = self.user(user_id).await.last_message_id;
        let event = InboundEvent::callback(identity(user_id), user_id, data, message_id)
            .with_language(Some("en".into()));
        self.engine.handle(event).await.expect("callback handled");
    }

    pub async fn user(&self, user_id: i64) -> UserProfile {
        self.store
            .get_user(user_id)
            .await
            .unwrap()
            .expect("user exists")
    }

    pub async fn product(&self, name: &str, price: i64) -> Product {
        self.store
            .create_product(&NewProduct {
                name: name.into(),
                price,
                description: format!("{name} description"),
            })
            .await
            .unwrap()
    }

    /// Runs the full registration for `user_id`
    pub async fn register(&self, user_id: i64) {
        self.text(user_id, "/start", 1).await;
        self.press(user_id, "gender_male").await;
        self.text(user_id, "Alex", 2).await;
        self.text(user_id, "+79117929394", 3).await;
        self.press(user_id, "confirm_registration").await;
    }
}
