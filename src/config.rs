//! # Configuration Module
//!
//! Runtime settings loaded from the environment (and `.env` via `dotenv`).
//! Parsing goes through [`Config::from_lookup`] so it can be exercised without
//! touching the process environment.

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::dialogue::FlowVariant;

pub const DEFAULT_ADMIN_API_PORT: u16 = 8000;
pub const DEFAULT_CURRENCY: &str = "RUB";
pub const DEFAULT_CART_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_BROADCAST_SEND_DELAY_MS: u64 = 100;

/// Retry policy for outbound sends
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// A policy that never waits, used by tests
    pub fn immediate() -> Self {
        Self {
            max_retries: 1,
            base_retry_delay_ms: 0,
            max_retry_delay_ms: 0,
        }
    }

    /// Exponential backoff for the given attempt (0-based), capped at the maximum
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_retry_delay_ms
            .saturating_mul(factor)
            .min(self.max_retry_delay_ms)
    }
}

/// Where shopping carts live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartStorage {
    Memory,
    Database,
}

impl FromStr for CartStorage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CartStorage::Memory),
            "database" | "db" | "postgres" => Ok(CartStorage::Database),
            other => Err(format!("unknown cart storage '{other}'")),
        }
    }
}

/// A free material handed out after registration
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub title: String,
    pub url: String,
}

fn default_materials() -> Vec<Material> {
    vec![
        Material {
            title: "Method fundamentals".to_string(),
            url: "https://example.com/material1".to_string(),
        },
        Material {
            title: "How and why it works".to_string(),
            url: "https://example.com/material2".to_string(),
        },
        Material {
            title: "Practical recommendations".to_string(),
            url: "https://example.com/material3".to_string(),
        },
    ]
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: Option<String>,
    pub admin_id: Option<i64>,
    pub admin_api_token: Option<String>,
    pub admin_api_port: u16,
    pub payment_provider_token: Option<String>,
    pub currency: String,
    pub registration_flow: FlowVariant,
    pub cart_storage: CartStorage,
    pub cart_ttl: Duration,
    pub broadcast_interval: Duration,
    pub broadcast_send_delay: Duration,
    pub default_language: String,
    pub materials: Vec<Material>,
    pub question_link: Option<String>,
    pub retry: RetryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("BOT_TOKEN"))
            .context("TELEGRAM_BOT_TOKEN must be set")?;

        let admin_id = get("ADMIN_ID")
            .map(|v| v.trim().parse::<i64>())
            .transpose()
            .context("ADMIN_ID must be a numeric user id")?
            .filter(|id| *id != 0);

        let admin_api_port = get("PORT")
            .map(|v| v.trim().parse::<u16>())
            .transpose()
            .context("PORT must be a valid port number")?
            .unwrap_or(DEFAULT_ADMIN_API_PORT);

        let registration_flow = get("REGISTRATION_FLOW")
            .map(|v| v.parse::<FlowVariant>())
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("REGISTRATION_FLOW must be 'full' or 'simple'")?
            .unwrap_or(FlowVariant::WithPhone);

        let cart_storage = get("CART_STORAGE")
            .map(|v| v.parse::<CartStorage>())
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("CART_STORAGE must be 'memory' or 'database'")?
            .unwrap_or(CartStorage::Memory);

        let secs = |key: &str, default: u64| -> Result<u64> {
            get(key)
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .with_context(|| format!("{key} must be a non-negative integer"))
                .map(|v| v.unwrap_or(default))
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: secs("SEND_MAX_RETRIES", u64::from(defaults.max_retries))?
                .try_into()
                .context("SEND_MAX_RETRIES is too large")?,
            base_retry_delay_ms: secs("SEND_BASE_DELAY_MS", defaults.base_retry_delay_ms)?,
            max_retry_delay_ms: secs("SEND_MAX_DELAY_MS", defaults.max_retry_delay_ms)?,
        };

        let mut materials = default_materials();
        for (index, material) in materials.iter_mut().enumerate() {
            let n = index + 1;
            if let Some(url) = get(&format!("MATERIAL_{n}_URL")) {
                material.url = url;
            }
            if let Some(title) = get(&format!("MATERIAL_{n}_TITLE")) {
                material.title = title;
            }
        }

        let default_language = get("DEFAULT_LANGUAGE")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "en".to_string());

        Ok(Self {
            bot_token,
            database_url: get("DATABASE_URL"),
            admin_id,
            admin_api_token: get("API_SECRET_KEY"),
            admin_api_port,
            payment_provider_token: get("PAYMENT_PROVIDER_TOKEN"),
            currency: get("CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            registration_flow,
            cart_storage,
            cart_ttl: Duration::from_secs(secs("CART_TTL_SECS", DEFAULT_CART_TTL_SECS)?),
            broadcast_interval: Duration::from_secs(
                secs("BROADCAST_INTERVAL_SECS", DEFAULT_BROADCAST_INTERVAL_SECS)?.max(1),
            ),
            broadcast_send_delay: Duration::from_millis(secs(
                "BROADCAST_SEND_DELAY_MS",
                DEFAULT_BROADCAST_SEND_DELAY_MS,
            )?),
            default_language,
            materials,
            question_link: get("ANONYMOUS_QUESTION_LINK"),
            retry,
        })
    }
}
