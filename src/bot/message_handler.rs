//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::PreCheckoutQuery;
use tracing::{debug, error, warn};

use crate::payments::{PayerInfo, PaymentConfirmedEvent, PreCheckoutDecision, PreCheckoutEvent};

use super::engine::ConversationEngine;
use super::event::{EventKind, InboundEvent};
use super::telegram::identity_of;

/// Handle incoming messages: text, commands and successful payments
pub async fn message_handler(msg: Message, engine: Arc<ConversationEngine>) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
        return Ok(());
    };
    let identity = identity_of(user);
    let language_code = user.language_code.clone();

    if let Some(payment) = msg.successful_payment() {
        let event = PaymentConfirmedEvent {
            user: identity,
            chat_id: msg.chat.id.0,
            payload: payment.invoice_payload.clone(),
            total_amount: payment.total_amount,
            currency: payment.currency.clone(),
            provider_charge_id: payment.provider_payment_charge_id.clone(),
            payer: PayerInfo {
                name: payment.order_info.name.clone(),
                phone: payment.order_info.phone_number.clone(),
                email: payment.order_info.email.clone(),
            },
            language_code,
        };
        if let Err(e) = engine.payment_confirmed(event).await {
            error!(user_id = %user.id, error = %e, "Payment confirmation failed");
        }
        return Ok(());
    }

    let kind = match msg.text() {
        Some(text) => EventKind::Text(text.to_string()),
        None => EventKind::Unsupported,
    };
    let event = InboundEvent {
        user: identity,
        chat_id: msg.chat.id.0,
        kind,
        source_message_id: Some(msg.id.0),
        language_code,
    };

    if let Err(e) = engine.handle(event).await {
        error!(user_id = %user.id, error = %e, "Failed to handle message");
    }
    Ok(())
}

/// Answer the payment gateway's pre-checkout query
pub async fn pre_checkout_handler(
    bot: Bot,
    q: PreCheckoutQuery,
    engine: Arc<ConversationEngine>,
) -> Result<()> {
    let event = PreCheckoutEvent {
        user_id: q.from.id.0 as i64,
        payload: q.invoice_payload.clone(),
        total_amount: q.total_amount,
        currency: q.currency.clone(),
        language_code: q.from.language_code.clone(),
    };

    match engine.pre_checkout(&event).await {
        PreCheckoutDecision::Accept => {
            bot.answer_pre_checkout_query(q.id, true).await?;
        }
        PreCheckoutDecision::Reject(reason) => {
            warn!(user_id = %q.from.id, reason = %reason, "Pre-checkout rejected");
            bot.answer_pre_checkout_query(q.id, false)
                .error_message(reason)
                .await?;
        }
    }
    Ok(())
}
