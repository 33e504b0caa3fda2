//! # Conversation Engine
//!
//! Stateless between events: every turn reloads the profile, routes on the
//! persisted stage and writes the next stage back before showing its prompt.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, Material, RetryConfig, DEFAULT_CURRENCY};
use crate::dialogue::{FlowVariant, ProfileFlow, Stage};
use crate::errors::ConversationError;
use crate::localization::t_lang;
use crate::model::UserProfile;
use crate::store::{CartStore, CatalogStore, UserStore};
use crate::user_locks::UserLocks;

use super::event::{route_text, CallbackAction, Command, EventKind, InboundEvent, TextRoute};
use super::gateway::{MessageGateway, Outbound, Prompt};
use super::screen::Screen;
use super::ui_builder::{flow_prompt, help_prompt, main_menu_prompt};

/// Behaviour switches taken from [`Config`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub flow_variant: FlowVariant,
    pub admin_id: Option<i64>,
    pub currency: String,
    pub payments_enabled: bool,
    pub materials: Vec<Material>,
    pub question_link: Option<String>,
    pub retry: RetryConfig,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flow_variant: config.registration_flow,
            admin_id: config.admin_id,
            currency: config.currency.clone(),
            payments_enabled: config.payment_provider_token.is_some(),
            materials: config.materials.clone(),
            question_link: config.question_link.clone(),
            retry: config.retry.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            flow_variant: FlowVariant::WithPhone,
            admin_id: None,
            currency: DEFAULT_CURRENCY.to_string(),
            payments_enabled: false,
            materials: Vec::new(),
            question_link: None,
            retry: RetryConfig::default(),
        }
    }
}

/// One inbound event together with the profile it was routed on
pub(super) struct Turn {
    pub event: InboundEvent,
    pub profile: UserProfile,
}

impl Turn {
    pub fn lang(&self) -> Option<&str> {
        self.event.language_code.as_deref()
    }

    pub fn user_id(&self) -> i64 {
        self.profile.user_id
    }

    pub fn stage(&self) -> Stage {
        self.profile.stage
    }
}

pub struct ConversationEngine {
    pub(super) users: Arc<dyn UserStore>,
    pub(super) catalog: Arc<dyn CatalogStore>,
    pub(super) carts: Arc<dyn CartStore>,
    pub(super) screen: Screen,
    pub(super) locks: UserLocks,
    pub(super) settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogStore>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn MessageGateway>,
        settings: EngineSettings,
    ) -> Self {
        let screen = Screen::new(gateway, Arc::clone(&users), settings.retry.clone());
        Self {
            users,
            catalog,
            carts,
            screen,
            locks: UserLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Processes one inbound event to completion.
    ///
    /// Events for the same user are serialized; different users run in parallel.
    pub async fn handle(&self, event: InboundEvent) -> Result<(), ConversationError> {
        let lock = self.locks.lock_for(event.user_id());
        let _guard = lock.lock().await;

        let profile = self.users.upsert_user(&event.user).await?;
        debug!(user_id = profile.user_id, stage = %profile.stage, kind = ?event.kind, "Handling event");

        let turn = Turn { event, profile };
        match turn.event.kind.clone() {
            EventKind::Text(text) => self.handle_text(&turn, &text).await,
            EventKind::Callback(data) => self.handle_callback(&turn, &data).await,
            EventKind::Unsupported => {
                self.screen.discard_user_message(&turn.event).await;
                let notice = t_lang("unsupported-message", turn.lang());
                self.rerender_stage(&turn, Some(notice)).await
            }
        }
    }

    /// Drops per-user locks nobody is waiting on
    pub fn release_idle_locks(&self) -> usize {
        self.locks.release_idle()
    }

    async fn handle_text(&self, turn: &Turn, text: &str) -> Result<(), ConversationError> {
        let route = route_text(turn.stage(), text);
        debug!(user_id = turn.user_id(), stage = %turn.stage(), route = ?route, "Routed text");

        if route != TextRoute::ConfirmationMisclick {
            self.screen.discard_user_message(&turn.event).await;
        }

        match route {
            TextRoute::Command(command, args) => self.handle_command(turn, command, &args).await,
            TextRoute::FlowInput(step) => self.handle_flow_input(turn, step, text).await,
            TextRoute::UseButtons | TextRoute::ConfirmationMisclick => {
                let notice = t_lang("use-buttons-notice", turn.lang());
                self.rerender_stage(turn, Some(notice)).await
            }
            TextRoute::Idle => self.show(turn, main_menu_prompt(turn.lang())).await,
            TextRoute::Restart => self.start(turn).await,
        }
    }

    async fn handle_command(
        &self,
        turn: &Turn,
        command: Command,
        args: &str,
    ) -> Result<(), ConversationError> {
        if !command.allowed_unregistered() && !turn.stage().is_registered() {
            debug!(user_id = turn.user_id(), command = ?command, "Command requires registration");
            let notice = t_lang("finish-registration-first", turn.lang());
            return self.rerender_stage(turn, Some(notice)).await;
        }

        match command {
            Command::Start => self.start(turn).await,
            Command::Help => self.show(turn, help_prompt(turn.lang())).await,
            Command::Shop => self.show_catalog(turn, None).await,
            Command::Cart => self.show_cart(turn, None).await,
            Command::Orders => self.show_orders(turn).await,
            Command::Profile => self.show_profile(turn).await,
            Command::Add => match args.trim().parse::<i64>() {
                Ok(product_id) if product_id > 0 => self.add_to_cart(turn, product_id).await,
                _ => {
                    let notice = t_lang("add-usage", turn.lang());
                    self.rerender_stage(turn, Some(notice)).await
                }
            },
            Command::Admin => self.show_admin_stats(turn).await,
            Command::Broadcast => self.schedule_broadcast(turn, args).await,
            Command::Meeting => self.schedule_meeting(turn, args).await,
            Command::Offer => self.schedule_offer(turn, args).await,
            Command::Users => self.show_admin_users(turn).await,
            Command::Unknown(name) => {
                debug!(user_id = turn.user_id(), command = %name, "Unknown command");
                let notice = t_lang("unknown-command", turn.lang());
                self.rerender_stage(turn, Some(notice)).await
            }
        }
    }

    async fn handle_callback(&self, turn: &Turn, data: &str) -> Result<(), ConversationError> {
        let Some(action) = CallbackAction::parse(data) else {
            warn!(user_id = turn.user_id(), data = %data, "Unrecognised callback payload");
            return self.rerender_stage(turn, None).await;
        };

        if action.requires_registration() && !turn.stage().is_registered() {
            debug!(user_id = turn.user_id(), action = ?action, "Menu action before registration");
            let notice = t_lang("finish-registration-first", turn.lang());
            return self.rerender_stage(turn, Some(notice)).await;
        }

        match action {
            CallbackAction::Gender(gender) => self.handle_gender(turn, gender).await,
            CallbackAction::ConfirmRegistration => self.handle_confirm(turn).await,
            CallbackAction::EditRegistration => self.handle_edit_registration(turn).await,
            CallbackAction::EditField(field) => self.handle_edit_field(turn, field).await,
            CallbackAction::BackToConfirmation => self.handle_back_to_confirmation(turn).await,
            CallbackAction::KeepCurrent => self.handle_keep_current(turn).await,
            CallbackAction::CancelEdit => self.handle_cancel_edit(turn).await,
            CallbackAction::MainMenu => self.show(turn, main_menu_prompt(turn.lang())).await,
            CallbackAction::Catalog => self.show_catalog(turn, None).await,
            CallbackAction::Product(id) => self.show_product(turn, id).await,
            CallbackAction::AddToCart(id) => self.add_to_cart(turn, id).await,
            CallbackAction::RemoveFromCart(id) => self.remove_from_cart(turn, id).await,
            CallbackAction::Cart => self.show_cart(turn, None).await,
            CallbackAction::ClearCart => self.clear_cart(turn).await,
            CallbackAction::Checkout => self.checkout(turn).await,
            CallbackAction::Orders => self.show_orders(turn).await,
            CallbackAction::Profile => self.show_profile(turn).await,
            CallbackAction::EditProfile => self.handle_edit_profile(turn).await,
            CallbackAction::BuyProduct(id) => self.buy_product(turn, id).await,
            CallbackAction::PayOrder(id) => self.pay_order(turn, id).await,
            CallbackAction::AdminUsers => self.show_admin_users(turn).await,
        }
    }

    /// Replaces the user's screen with `prompt`
    pub(super) async fn show(&self, turn: &Turn, prompt: Prompt) -> Result<(), ConversationError> {
        self.present(turn, Outbound::Prompt(prompt)).await
    }

    pub(super) async fn present(&self, turn: &Turn, outbound: Outbound) -> Result<(), ConversationError> {
        self.screen
            .present(&turn.event, turn.profile.last_message_id, outbound)
            .await
            .map(|_| ())
    }

    pub(super) async fn set_stage(&self, turn: &Turn, stage: Stage) -> Result<(), ConversationError> {
        if turn.stage() != stage {
            self.users.set_stage(turn.user_id(), stage).await?;
            info!(user_id = turn.user_id(), from = %turn.stage(), to = %stage, "Stage changed");
        }
        Ok(())
    }

    /// Shows the prompt of the user's current stage again, optionally with a notice on top
    pub(super) async fn rerender_stage(
        &self,
        turn: &Turn,
        notice: Option<String>,
    ) -> Result<(), ConversationError> {
        let prompt = match turn.stage() {
            Stage::Start => return self.start(turn).await,
            Stage::Registered => main_menu_prompt(turn.lang()),
            stage => match ProfileFlow::locate(stage, self.settings.flow_variant) {
                Some((flow, step)) => flow_prompt(flow, step, &turn.profile, turn.lang()),
                None => main_menu_prompt(turn.lang()),
            },
        };
        self.show(turn, prompt.with_notice(notice)).await
    }
}
