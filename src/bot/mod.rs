//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `event`: normalized inbound events and text routing
//! - `engine`: the conversation engine and its turn loop
//! - `dialogue_manager`: registration and profile-edit transitions
//! - `shop_handler`: catalog, cart, orders and admin commands
//! - `payment_handler`: pre-checkout and payment confirmation
//! - `screen`: delete-then-send replacement of the user's screen
//! - `ui_builder`: creates keyboards and formats messages
//! - `gateway`: transport-neutral outbound messages
//! - `telegram`, `message_handler`, `callback_handler`: the Telegram adapter

pub mod callback_handler;
pub mod dialogue_manager;
pub mod engine;
pub mod event;
pub mod gateway;
pub mod message_handler;
pub mod payment_handler;
pub mod screen;
pub mod shop_handler;
pub mod telegram;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use engine::{ConversationEngine, EngineSettings};
pub use event::{EventKind, InboundEvent};
pub use gateway::{Button, Keyboard, MessageGateway, Outbound, Prompt};
pub use message_handler::{message_handler, pre_checkout_handler};
pub use telegram::{run_dispatcher, TelegramGateway};
