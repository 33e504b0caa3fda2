//! Shop handlers: catalog, cart, orders, profile view and the chat admin commands.

use tracing::{debug, info, warn};

use crate::cart;
use crate::errors::ConversationError;
use crate::localization::{t_args_lang, t_lang};
use crate::model::{
    saturating_total, Audience, MeetingInvite, NewNotification, OrderStatus, Product, SpecialOffer,
    TemplateArgsError,
};
use crate::payments::{order_invoice, product_invoice};

use super::engine::{ConversationEngine, Turn};
use super::gateway::Outbound;
use super::ui_builder::{
    admin_prompt, admin_users_prompt, cart_prompt, catalog_prompt, main_menu_prompt,
    meeting_announcement, offer_announcement, order_created_prompt, orders_prompt, product_prompt,
    profile_prompt, AdminSummary,
};

/// Splits `/broadcast` arguments of the form `title | message`
pub fn parse_broadcast_args(args: &str) -> Option<(String, String)> {
    let (title, message) = args.split_once('|')?;
    let (title, message) = (title.trim(), message.trim());
    if title.is_empty() || message.is_empty() {
        return None;
    }
    Some((title.to_string(), message.to_string()))
}

impl ConversationEngine {
    async fn active_product(&self, product_id: i64) -> Result<Option<Product>, ConversationError> {
        Ok(self
            .catalog
            .get_product(product_id)
            .await?
            .filter(|product| product.is_active))
    }

    async fn product_not_found(&self, turn: &Turn, product_id: i64) -> Result<(), ConversationError> {
        warn!(user_id = turn.user_id(), product_id, "Product not found");
        let notice = t_lang("product-not-found", turn.lang());
        self.show_catalog(turn, Some(notice)).await
    }

    fn is_admin(&self, turn: &Turn) -> bool {
        self.settings.admin_id == Some(turn.user_id())
    }

    async fn deny_admin(&self, turn: &Turn) -> Result<(), ConversationError> {
        warn!(user_id = turn.user_id(), "Admin command from non-admin user");
        let notice = t_lang("admin-denied", turn.lang());
        self.rerender_stage(turn, Some(notice)).await
    }

    pub(super) async fn show_catalog(
        &self,
        turn: &Turn,
        notice: Option<String>,
    ) -> Result<(), ConversationError> {
        let products = self.catalog.list_products(false).await?;
        let prompt = catalog_prompt(&products, &self.settings.currency, turn.lang());
        self.show(turn, prompt.with_notice(notice)).await
    }

    pub(super) async fn show_product(&self, turn: &Turn, product_id: i64) -> Result<(), ConversationError> {
        match self.active_product(product_id).await? {
            Some(product) => {
                let prompt = product_prompt(
                    &product,
                    &self.settings.currency,
                    self.settings.payments_enabled,
                    turn.lang(),
                );
                self.show(turn, prompt).await
            }
            None => self.product_not_found(turn, product_id).await,
        }
    }

    pub(super) async fn add_to_cart(&self, turn: &Turn, product_id: i64) -> Result<(), ConversationError> {
        let Some(product) = self.active_product(product_id).await? else {
            return self.product_not_found(turn, product_id).await;
        };
        let cart = self.carts.add_item(turn.user_id(), &product, 1).await?;
        info!(user_id = turn.user_id(), product_id, items = cart.items.len(), "Added to cart");

        let notice = t_args_lang("added-to-cart", &[("name", &product.name)], turn.lang());
        let prompt = cart_prompt(&cart, &self.settings.currency, turn.lang());
        self.show(turn, prompt.with_notice(Some(notice))).await
    }

    pub(super) async fn remove_from_cart(
        &self,
        turn: &Turn,
        product_id: i64,
    ) -> Result<(), ConversationError> {
        let cart = self.carts.remove_item(turn.user_id(), product_id).await?;
        debug!(user_id = turn.user_id(), product_id, "Removed from cart");
        self.show(turn, cart_prompt(&cart, &self.settings.currency, turn.lang()))
            .await
    }

    pub(super) async fn show_cart(&self, turn: &Turn, notice: Option<String>) -> Result<(), ConversationError> {
        let cart = self.carts.get_cart(turn.user_id()).await?;
        let prompt = cart_prompt(&cart, &self.settings.currency, turn.lang());
        self.show(turn, prompt.with_notice(notice)).await
    }

    pub(super) async fn clear_cart(&self, turn: &Turn) -> Result<(), ConversationError> {
        self.carts.clear_cart(turn.user_id()).await?;
        info!(user_id = turn.user_id(), "Cart cleared");
        let notice = t_lang("cart-cleared", turn.lang());
        self.show_cart(turn, Some(notice)).await
    }

    pub(super) async fn checkout(&self, turn: &Turn) -> Result<(), ConversationError> {
        let order = cart::checkout(self.carts.as_ref(), self.catalog.as_ref(), turn.user_id()).await?;
        match order {
            Some(order) => {
                let prompt = order_created_prompt(
                    &order,
                    &self.settings.currency,
                    self.settings.payments_enabled,
                    turn.lang(),
                );
                self.show(turn, prompt).await
            }
            None => self.show_cart(turn, None).await,
        }
    }

    pub(super) async fn show_orders(&self, turn: &Turn) -> Result<(), ConversationError> {
        let orders = self.catalog.list_orders_by_user(turn.user_id()).await?;
        self.show(turn, orders_prompt(&orders, &self.settings.currency, turn.lang()))
            .await
    }

    pub(super) async fn show_profile(&self, turn: &Turn) -> Result<(), ConversationError> {
        self.show(turn, profile_prompt(&turn.profile, turn.lang())).await
    }

    async fn payments_unavailable(&self, turn: &Turn) -> Result<(), ConversationError> {
        debug!(user_id = turn.user_id(), "Purchase requested without a payment provider");
        let prompt = main_menu_prompt(turn.lang())
            .with_notice(Some(t_lang("payments-unavailable", turn.lang())));
        self.show(turn, prompt).await
    }

    /// Sends an invoice for one product
    pub(super) async fn buy_product(&self, turn: &Turn, product_id: i64) -> Result<(), ConversationError> {
        if !self.settings.payments_enabled {
            return self.payments_unavailable(turn).await;
        }
        let Some(product) = self.active_product(product_id).await? else {
            return self.product_not_found(turn, product_id).await;
        };
        match product_invoice(&product, &self.settings.currency) {
            Some(invoice) => {
                info!(user_id = turn.user_id(), product_id, payload = %invoice.payload, "Sending invoice");
                self.present(turn, Outbound::Invoice(invoice)).await
            }
            None => {
                warn!(user_id = turn.user_id(), product_id, price = product.price, "Price cannot be invoiced");
                self.show_catalog(turn, Some(t_lang("invoice-error", turn.lang())))
                    .await
            }
        }
    }

    /// Sends an invoice for one of the user's pending orders
    pub(super) async fn pay_order(&self, turn: &Turn, order_id: i64) -> Result<(), ConversationError> {
        if !self.settings.payments_enabled {
            return self.payments_unavailable(turn).await;
        }
        let order = self
            .catalog
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == turn.user_id() && order.status == OrderStatus::Pending);

        let invoice = order
            .as_ref()
            .and_then(|order| order_invoice(order, &self.settings.currency, turn.lang()));
        match invoice {
            Some(invoice) => {
                info!(user_id = turn.user_id(), order_id, payload = %invoice.payload, "Sending invoice");
                self.present(turn, Outbound::Invoice(invoice)).await
            }
            None => {
                warn!(user_id = turn.user_id(), order_id, "Order cannot be paid");
                let prompt = main_menu_prompt(turn.lang())
                    .with_notice(Some(t_lang("order-not-payable", turn.lang())));
                self.show(turn, prompt).await
            }
        }
    }

    /// `/admin`: headline numbers for the chat admin
    pub(super) async fn show_admin_stats(&self, turn: &Turn) -> Result<(), ConversationError> {
        if !self.is_admin(turn) {
            return self.deny_admin(turn).await;
        }
        let users = self.users.list_users().await?;
        let orders = self.catalog.list_orders().await?;
        let paid: Vec<_> = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Paid)
            .collect();
        let summary = AdminSummary {
            users: users.len(),
            registered: users
                .iter()
                .filter(|user| user.stage.is_registered())
                .count(),
            orders: orders.len(),
            paid_orders: paid.len(),
            revenue: saturating_total(paid.iter().map(|order| order.total_amount)),
        };
        self.show(turn, admin_prompt(&summary, &self.settings.currency, turn.lang()))
            .await
    }

    /// `/broadcast title | message`: queues a notification for every user
    pub(super) async fn schedule_broadcast(&self, turn: &Turn, args: &str) -> Result<(), ConversationError> {
        if !self.is_admin(turn) {
            return self.deny_admin(turn).await;
        }
        let Some((title, message)) = parse_broadcast_args(args) else {
            let notice = t_lang("broadcast-usage", turn.lang());
            return self.rerender_stage(turn, Some(notice)).await;
        };

        self.queue_announcement(turn, title, message).await
    }

    /// `/meeting title | description | date | [link]`
    pub(super) async fn schedule_meeting(&self, turn: &Turn, args: &str) -> Result<(), ConversationError> {
        if !self.is_admin(turn) {
            return self.deny_admin(turn).await;
        }
        let invite = match MeetingInvite::parse(args) {
            Ok(invite) => invite,
            Err(err) => return self.template_args_refused(turn, "meeting", err).await,
        };
        let (title, message) = meeting_announcement(&invite, None);
        self.queue_announcement(turn, title, message).await
    }

    /// `/offer title | description | [discount] | [valid until]`
    pub(super) async fn schedule_offer(&self, turn: &Turn, args: &str) -> Result<(), ConversationError> {
        if !self.is_admin(turn) {
            return self.deny_admin(turn).await;
        }
        let offer = match SpecialOffer::parse(args) {
            Ok(offer) => offer,
            Err(err) => return self.template_args_refused(turn, "offer", err).await,
        };
        let (title, message) = offer_announcement(&offer, None);
        self.queue_announcement(turn, title, message).await
    }

    /// `/users` and the admin users button
    pub(super) async fn show_admin_users(&self, turn: &Turn) -> Result<(), ConversationError> {
        if !self.is_admin(turn) {
            return self.deny_admin(turn).await;
        }
        let users = self.users.list_users().await?;
        debug!(user_id = turn.user_id(), users = users.len(), "Listing users for admin");
        self.show(turn, admin_users_prompt(&users, turn.lang())).await
    }

    async fn template_args_refused(
        &self,
        turn: &Turn,
        command: &str,
        err: TemplateArgsError,
    ) -> Result<(), ConversationError> {
        debug!(user_id = turn.user_id(), command, error = ?err, "Announcement arguments refused");
        let key = match err {
            TemplateArgsError::Missing => format!("{command}-usage"),
            TemplateArgsError::TooFew => format!("{command}-too-few"),
        };
        let notice = t_lang(&key, turn.lang());
        self.rerender_stage(turn, Some(notice)).await
    }

    /// Queues a notification for every user, sent by the scheduler on its next tick
    async fn queue_announcement(
        &self,
        turn: &Turn,
        title: String,
        message: String,
    ) -> Result<(), ConversationError> {
        let notification = self
            .catalog
            .create_notification(&NewNotification {
                title,
                message,
                target_audience: Audience::All,
                scheduled_at: None,
            })
            .await?;
        info!(user_id = turn.user_id(), notification_id = notification.id, "Broadcast scheduled");

        let notice = t_args_lang(
            "broadcast-scheduled",
            &[("title", &notification.title)],
            turn.lang(),
        );
        self.rerender_stage(turn, Some(notice)).await
    }
}
