//! Payment Handler module: pre-checkout validation and payment confirmation

use tracing::{error, info, warn};

use crate::errors::ConversationError;
use crate::localization::t_lang;
use crate::model::{NewOrder, Order, OrderItem, OrderStatus};
use crate::payments::{
    to_minor_units, InvoicePayload, PaymentConfirmedEvent, PreCheckoutDecision, PreCheckoutEvent,
};

use super::engine::ConversationEngine;
use super::gateway::Outbound;
use super::ui_builder::{payment_failed_prompt, payment_success_prompt};

impl ConversationEngine {
    /// Decides whether the gateway may charge the payer
    pub async fn pre_checkout(&self, event: &PreCheckoutEvent) -> PreCheckoutDecision {
        let lang = event.language_code.as_deref();
        let payload = match event.payload.parse::<InvoicePayload>() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(user_id = event.user_id, error = %e, "Pre-checkout with unreadable payload");
                return PreCheckoutDecision::Reject(t_lang("precheckout-error", lang));
            }
        };

        let decision = match payload {
            InvoicePayload::Product(product_id) => match self.catalog.get_product(product_id).await {
                Ok(Some(product)) if product.is_active => PreCheckoutDecision::Accept,
                Ok(_) => PreCheckoutDecision::Reject(t_lang("precheckout-product-missing", lang)),
                Err(e) => {
                    error!(user_id = event.user_id, product_id, error = %e, "Pre-checkout lookup failed");
                    PreCheckoutDecision::Reject(t_lang("precheckout-error", lang))
                }
            },
            InvoicePayload::Order(order_id) => match self.catalog.get_order(order_id).await {
                Ok(Some(order))
                    if order.user_id == event.user_id && order.status == OrderStatus::Pending =>
                {
                    PreCheckoutDecision::Accept
                }
                Ok(_) => PreCheckoutDecision::Reject(t_lang("precheckout-order-invalid", lang)),
                Err(e) => {
                    error!(user_id = event.user_id, order_id, error = %e, "Pre-checkout lookup failed");
                    PreCheckoutDecision::Reject(t_lang("precheckout-error", lang))
                }
            },
        };

        info!(user_id = event.user_id, payload = %payload, decision = ?decision, "Pre-checkout answered");
        decision
    }

    /// Records a completed payment as a paid order and tells the user.
    ///
    /// On failure no order is created and the user gets a failure message.
    pub async fn payment_confirmed(&self, event: PaymentConfirmedEvent) -> Result<Order, ConversationError> {
        let user_id = event.user.user_id;
        let lock = self.locks.lock_for(user_id);
        let _guard = lock.lock().await;

        let profile = self.users.upsert_user(&event.user).await?;
        let lang = event.language_code.as_deref();
        let targets: Vec<i32> = profile.last_message_id.into_iter().collect();

        match self.settle_payment(&event).await {
            Ok(order) => {
                info!(
                    user_id,
                    order_id = order.id,
                    total = order.total_amount,
                    charge_id = %event.provider_charge_id,
                    "Payment settled"
                );
                let prompt = payment_success_prompt(
                    &order,
                    &self.settings.currency,
                    event.payer.contact(),
                    lang,
                );
                self.screen
                    .replace(event.chat_id, user_id, &targets, &Outbound::Prompt(prompt))
                    .await?;
                Ok(order)
            }
            Err(e) => {
                error!(user_id, payload = %event.payload, error = %e, "Payment could not be settled");
                let reason = match (&e, event.payload.starts_with("order_")) {
                    (ConversationError::NotFound(_), true) => "order-not-found",
                    (ConversationError::NotFound(_), false) => "product-not-found",
                    (ConversationError::Payment(_), true) => "order-not-payable",
                    _ => "error-generic",
                };
                let prompt = payment_failed_prompt(reason, lang);
                if let Err(send_error) = self
                    .screen
                    .replace(event.chat_id, user_id, &targets, &Outbound::Prompt(prompt))
                    .await
                {
                    warn!(user_id, error = %send_error, "Failed to report payment failure");
                }
                Err(e)
            }
        }
    }

    async fn settle_payment(&self, event: &PaymentConfirmedEvent) -> Result<Order, ConversationError> {
        let user_id = event.user.user_id;
        let payload: InvoicePayload = event.payload.parse().map_err(ConversationError::Payment)?;
        let reference = event.provider_charge_id.as_str();

        if let Some(existing) = self
            .catalog
            .list_orders_by_user(user_id)
            .await?
            .into_iter()
            .find(|order| order.payment_reference.as_deref() == Some(reference))
        {
            info!(user_id, order_id = existing.id, "Duplicate payment confirmation");
            return Ok(existing);
        }

        let order = match payload {
            InvoicePayload::Product(product_id) => {
                let product = self
                    .catalog
                    .get_product(product_id)
                    .await?
                    .ok_or_else(|| ConversationError::NotFound(format!("product {product_id}")))?;
                self.catalog
                    .create_order(&NewOrder {
                        user_id,
                        items: vec![OrderItem {
                            product_id: product.id,
                            name: product.name.clone(),
                            unit_price: product.price,
                            quantity: 1,
                        }],
                        status: OrderStatus::Paid,
                        payment_reference: Some(reference.to_string()),
                    })
                    .await?
            }
            InvoicePayload::Order(order_id) => {
                let order = self
                    .catalog
                    .get_order(order_id)
                    .await?
                    .ok_or_else(|| ConversationError::NotFound(format!("order {order_id}")))?;
                if order.user_id != user_id {
                    return Err(ConversationError::Payment(format!(
                        "order {order_id} belongs to another user"
                    )));
                }
                let updated = self
                    .catalog
                    .update_order_status(order_id, OrderStatus::Paid, Some(reference))
                    .await?;
                if !updated {
                    return Err(ConversationError::Payment(format!(
                        "order {order_id} is {} and cannot be paid",
                        order.status
                    )));
                }
                self.catalog
                    .get_order(order_id)
                    .await?
                    .ok_or_else(|| ConversationError::NotFound(format!("order {order_id}")))?
            }
        };

        if to_minor_units(order.total_amount) != Some(event.total_amount) {
            warn!(
                user_id,
                order_id = order.id,
                expected = order.total_amount,
                charged_minor = event.total_amount,
                "Charged amount differs from order total"
            );
        }

        Ok(order)
    }
}
