//! Normalized inbound events and the pure routing decisions made on them.

use crate::dialogue::{FlowStep, Gender, Stage};
use crate::model::UserIdentity;

/// What the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Free text or a command
    Text(String),
    /// Inline button press with its payload
    Callback(String),
    /// Stickers, photos and anything else the bot does not read
    Unsupported,
}

/// One inbound interaction, whichever way it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub user: UserIdentity,
    pub chat_id: i64,
    pub kind: EventKind,
    /// The user's own message for text, the pressed message for callbacks
    pub source_message_id: Option<i32>,
    pub language_code: Option<String>,
}

impl InboundEvent {
    pub fn text(user: UserIdentity, chat_id: i64, text: impl Into<String>, message_id: i32) -> Self {
        Self {
            user,
            chat_id,
            kind: EventKind::Text(text.into()),
            source_message_id: Some(message_id),
            language_code: None,
        }
    }

    pub fn callback(
        user: UserIdentity,
        chat_id: i64,
        data: impl Into<String>,
        message_id: Option<i32>,
    ) -> Self {
        Self {
            user,
            chat_id,
            kind: EventKind::Callback(data.into()),
            source_message_id: message_id,
            language_code: None,
        }
    }

    pub fn with_language(mut self, language_code: Option<String>) -> Self {
        self.language_code = language_code;
        self
    }

    pub fn user_id(&self) -> i64 {
        self.user.user_id
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.kind, EventKind::Callback(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Shop,
    Cart,
    Orders,
    Profile,
    Add,
    Admin,
    Broadcast,
    Meeting,
    Offer,
    Users,
    Unknown(String),
}

impl Command {
    /// Splits `/name@bot args` into a command and its argument text
    pub fn parse(text: &str) -> Option<(Command, String)> {
        let rest = text.trim().strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "shop" | "catalog" => Command::Shop,
            "cart" => Command::Cart,
            "orders" => Command::Orders,
            "profile" => Command::Profile,
            "add" => Command::Add,
            "admin" => Command::Admin,
            "broadcast" => Command::Broadcast,
            "meeting" => Command::Meeting,
            "offer" => Command::Offer,
            "users" => Command::Users,
            _ => Command::Unknown(name),
        };
        Some((command, args.to_string()))
    }

    /// Commands that work before registration is finished
    pub fn allowed_unregistered(&self) -> bool {
        matches!(
            self,
            Command::Start
                | Command::Help
                | Command::Admin
                | Command::Broadcast
                | Command::Meeting
                | Command::Offer
                | Command::Users
                | Command::Unknown(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Name,
    Phone,
}

/// Every inline button the bot renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Gender(Gender),
    ConfirmRegistration,
    EditRegistration,
    EditField(EditableField),
    BackToConfirmation,
    KeepCurrent,
    CancelEdit,
    MainMenu,
    Catalog,
    Product(i64),
    AddToCart(i64),
    RemoveFromCart(i64),
    Cart,
    ClearCart,
    Checkout,
    Orders,
    Profile,
    EditProfile,
    BuyProduct(i64),
    PayOrder(i64),
    AdminUsers,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "gender_male" => CallbackAction::Gender(Gender::Male),
            "gender_female" => CallbackAction::Gender(Gender::Female),
            "confirm_registration" => CallbackAction::ConfirmRegistration,
            "edit_registration" => CallbackAction::EditRegistration,
            "edit_field_name" => CallbackAction::EditField(EditableField::Name),
            "edit_field_phone" => CallbackAction::EditField(EditableField::Phone),
            "back_to_confirmation" => CallbackAction::BackToConfirmation,
            "keep_current" => CallbackAction::KeepCurrent,
            "cancel_edit" => CallbackAction::CancelEdit,
            "main_menu" => CallbackAction::MainMenu,
            "catalog" => CallbackAction::Catalog,
            "cart" => CallbackAction::Cart,
            "clear_cart" => CallbackAction::ClearCart,
            "checkout" => CallbackAction::Checkout,
            "orders" => CallbackAction::Orders,
            "profile" => CallbackAction::Profile,
            "edit_profile" => CallbackAction::EditProfile,
            "admin_users" => CallbackAction::AdminUsers,
            _ => {
                let (prefix, id) = data.rsplit_once('_')?;
                let id = id.parse::<i64>().ok().filter(|id| *id > 0)?;
                match prefix {
                    "product" => CallbackAction::Product(id),
                    "add" => CallbackAction::AddToCart(id),
                    "remove" => CallbackAction::RemoveFromCart(id),
                    "buy" => CallbackAction::BuyProduct(id),
                    "pay" => CallbackAction::PayOrder(id),
                    _ => return None,
                }
            }
        };
        Some(action)
    }

    /// Payload carried by the button
    pub fn data(&self) -> String {
        match self {
            CallbackAction::Gender(Gender::Female) => "gender_female".into(),
            CallbackAction::Gender(_) => "gender_male".into(),
            CallbackAction::ConfirmRegistration => "confirm_registration".into(),
            CallbackAction::EditRegistration => "edit_registration".into(),
            CallbackAction::EditField(EditableField::Name) => "edit_field_name".into(),
            CallbackAction::EditField(EditableField::Phone) => "edit_field_phone".into(),
            CallbackAction::BackToConfirmation => "back_to_confirmation".into(),
            CallbackAction::KeepCurrent => "keep_current".into(),
            CallbackAction::CancelEdit => "cancel_edit".into(),
            CallbackAction::MainMenu => "main_menu".into(),
            CallbackAction::Catalog => "catalog".into(),
            CallbackAction::Product(id) => format!("product_{id}"),
            CallbackAction::AddToCart(id) => format!("add_{id}"),
            CallbackAction::RemoveFromCart(id) => format!("remove_{id}"),
            CallbackAction::Cart => "cart".into(),
            CallbackAction::ClearCart => "clear_cart".into(),
            CallbackAction::Checkout => "checkout".into(),
            CallbackAction::Orders => "orders".into(),
            CallbackAction::Profile => "profile".into(),
            CallbackAction::EditProfile => "edit_profile".into(),
            CallbackAction::BuyProduct(id) => format!("buy_{id}"),
            CallbackAction::PayOrder(id) => format!("pay_{id}"),
            CallbackAction::AdminUsers => "admin_users".into(),
        }
    }

    /// Actions that belong to the registered menu rather than the profile flow
    pub fn requires_registration(&self) -> bool {
        matches!(
            self,
            CallbackAction::MainMenu
                | CallbackAction::Catalog
                | CallbackAction::Product(_)
                | CallbackAction::AddToCart(_)
                | CallbackAction::RemoveFromCart(_)
                | CallbackAction::Cart
                | CallbackAction::ClearCart
                | CallbackAction::Checkout
                | CallbackAction::Orders
                | CallbackAction::Profile
                | CallbackAction::EditProfile
                | CallbackAction::BuyProduct(_)
                | CallbackAction::PayOrder(_)
        )
    }
}

/// Where a free-text message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRoute {
    Command(Command, String),
    /// Input for the profile step the user is on
    FlowInput(FlowStep),
    /// Text where a button choice is expected
    UseButtons,
    /// Text on a confirmation screen, kept visible next to a warning
    ConfirmationMisclick,
    /// Text from a registered user outside any flow
    Idle,
    /// Text before the conversation has started
    Restart,
}

/// Decides what to do with a text message from the stage alone
pub fn route_text(stage: Stage, text: &str) -> TextRoute {
    if let Some((command, args)) = Command::parse(text) {
        return TextRoute::Command(command, args);
    }

    match FlowStep::of(stage) {
        Some(FlowStep::Confirm) => TextRoute::ConfirmationMisclick,
        Some(step) if step.accepts_text() => TextRoute::FlowInput(step),
        Some(_) => TextRoute::UseButtons,
        None if stage == Stage::Registered => TextRoute::Idle,
        None => TextRoute::Restart,
    }
}
