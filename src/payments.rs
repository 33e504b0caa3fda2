//! # Payments Module
//!
//! Invoice construction and the payment gateway callbacks. The gateway sees an
//! opaque payload string; it round-trips through [`InvoicePayload`].

use std::fmt;
use std::str::FromStr;

use crate::localization::{t_args_lang, t_lang};
use crate::model::{Order, Product, UserIdentity};

/// Minor units per major currency unit (kopecks, cents)
pub const MINOR_UNITS: i64 = 100;

/// Reference carried through the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoicePayload {
    /// Direct purchase of a single product
    Product(i64),
    /// Payment of a pending order created at checkout
    Order(i64),
}

impl fmt::Display for InvoicePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoicePayload::Product(id) => write!(f, "product_{id}"),
            InvoicePayload::Order(id) => write!(f, "order_{id}"),
        }
    }
}

impl FromStr for InvoicePayload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_id = |raw: &str| {
            raw.parse::<i64>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| format!("invalid id in payload '{s}'"))
        };

        if let Some(id) = s.strip_prefix("product_") {
            parse_id(id).map(InvoicePayload::Product)
        } else if let Some(id) = s.strip_prefix("order_") {
            parse_id(id).map(InvoicePayload::Order)
        } else {
            Err(format!("unrecognised payload '{s}'"))
        }
    }
}

/// Converts a price in major units to the gateway's minor units
pub fn to_minor_units(amount: i64) -> Option<u32> {
    amount
        .checked_mul(MINOR_UNITS)
        .and_then(|minor| u32::try_from(minor).ok())
        .filter(|minor| *minor > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: InvoicePayload,
    pub currency: String,
    pub label: String,
    pub amount_minor: u32,
}

/// Invoice for buying one product directly
pub fn product_invoice(product: &Product, currency: &str) -> Option<Invoice> {
    let description = if product.description.trim().is_empty() {
        product.name.clone()
    } else {
        product.description.clone()
    };
    Some(Invoice {
        title: product.name.clone(),
        description,
        payload: InvoicePayload::Product(product.id),
        currency: currency.to_string(),
        label: product.name.clone(),
        amount_minor: to_minor_units(product.price)?,
    })
}

/// Invoice for a pending order
pub fn order_invoice(order: &Order, currency: &str, language_code: Option<&str>) -> Option<Invoice> {
    let order_id = order.id.to_string();
    let title = t_args_lang("invoice-order-title", &[("order_id", &order_id)], language_code);
    let description = order
        .items
        .iter()
        .map(|item| format!("{} x{}", item.name, item.quantity))
        .collect::<Vec<_>>()
        .join(", ");
    Some(Invoice {
        label: title.clone(),
        title,
        description: if description.is_empty() {
            t_lang("invoice-order-description", language_code)
        } else {
            description
        },
        payload: InvoicePayload::Order(order.id),
        currency: currency.to_string(),
        amount_minor: to_minor_units(order.total_amount)?,
    })
}

/// Gateway asks whether a payment may proceed
#[derive(Debug, Clone, PartialEq)]
pub struct PreCheckoutEvent {
    pub user_id: i64,
    pub payload: String,
    pub total_amount: u32,
    pub currency: String,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheckoutDecision {
    Accept,
    /// Rejected with a reason shown to the payer
    Reject(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayerInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl PayerInfo {
    /// Preferred way to reach the payer, if any was collected
    pub fn contact(&self) -> Option<&str> {
        self.email.as_deref().or(self.phone.as_deref())
    }
}

/// The gateway charged the payer
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmedEvent {
    pub user: UserIdentity,
    pub chat_id: i64,
    pub payload: String,
    pub total_amount: u32,
    pub currency: String,
    pub provider_charge_id: String,
    pub payer: PayerInfo,
    pub language_code: Option<String>,
}
