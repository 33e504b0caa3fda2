//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, warn};

use super::engine::ConversationEngine;
use super::event::InboundEvent;
use super::telegram::identity_of;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    engine: Arc<ConversationEngine>,
) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query from user");

    // Private chats share their id with the user
    let (chat_id, message_id) = match &q.message {
        Some(message) => (message.chat().id.0, Some(message.id().0)),
        None => (q.from.id.0 as i64, None),
    };

    let event = InboundEvent::callback(
        identity_of(&q.from),
        chat_id,
        q.data.clone().unwrap_or_default(),
        message_id,
    )
    .with_language(q.from.language_code.clone());

    if let Err(e) = engine.handle(event).await {
        error!(user_id = %q.from.id, error = %e, "Failed to handle callback query");
    }

    // Stops the client-side spinner
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    Ok(())
}
