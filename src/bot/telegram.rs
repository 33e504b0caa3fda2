//! Telegram transport: the [`MessageGateway`] implementation and the update dispatcher

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, LabeledPrice, MessageId, User};
use tracing::info;

use crate::model::UserIdentity;
use crate::payments::Invoice;

use super::engine::ConversationEngine;
use super::gateway::{Keyboard, MessageGateway, Prompt};
use super::{callback_handler, message_handler, pre_checkout_handler};

/// Sends prompts and invoices through the Bot API
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    provider_token: Option<String>,
}

impl TelegramGateway {
    pub fn new(bot: Bot, provider_token: Option<String>) -> Self {
        Self { bot, provider_token }
    }
}

fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl MessageGateway for TelegramGateway {
    async fn send_prompt(&self, chat_id: i64, prompt: &Prompt) -> Result<i32> {
        let request = self.bot.send_message(ChatId(chat_id), prompt.text.clone());
        let message = match &prompt.keyboard {
            Some(keyboard) => request.reply_markup(inline_keyboard(keyboard)).await,
            None => request.await,
        }
        .with_context(|| format!("Failed to send message to chat {chat_id}"))?;
        Ok(message.id.0)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .with_context(|| format!("Failed to delete message {message_id} in chat {chat_id}"))?;
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<i32> {
        let prices = vec![LabeledPrice {
            label: invoice.label.clone(),
            amount: invoice.amount_minor,
        }];
        let mut request = self.bot.send_invoice(
            ChatId(chat_id),
            invoice.title.clone(),
            invoice.description.clone(),
            invoice.payload.to_string(),
            invoice.currency.clone(),
            prices,
        );
        if let Some(token) = &self.provider_token {
            request = request.provider_token(token.clone());
        }
        let message = request
            .need_name(true)
            .need_phone_number(true)
            .need_email(true)
            .await
            .with_context(|| format!("Failed to send invoice to chat {chat_id}"))?;
        Ok(message.id.0)
    }
}

/// Converts a Telegram user into the engine's identity record
pub fn identity_of(user: &User) -> UserIdentity {
    UserIdentity {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    }
}

/// Runs the long-polling dispatcher until Ctrl-C
pub async fn run_dispatcher(bot: Bot, engine: Arc<ConversationEngine>) {
    let handler = dptree::entry()
        .branch(Update::filter_pre_checkout_query().endpoint(pre_checkout_handler))
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    info!("Starting dispatcher");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
