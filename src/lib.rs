//! # Storefront Telegram Bot
//!
//! A Telegram bot that registers users through a short dialogue, then sells
//! products through a catalog, cart and payment flow. A companion HTTP API
//! lets administrators manage users, products, orders and broadcasts.

pub mod admin;
pub mod bot;
pub mod cart;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod memory_store;
pub mod model;
pub mod payments;
pub mod scheduler;
pub mod store;
pub mod user_locks;
