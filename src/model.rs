//! # Domain Model
//!
//! Records shared by the conversation engine, the stores and the admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dialogue::{Gender, PhoneNumber, Stage};

/// Platform identity of an end user, as reported by the messenger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub stage: Stage,
    pub last_message_id: Option<i32>,
    pub registration_date: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(identity: &UserIdentity, now: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            gender: Gender::Unset,
            name: None,
            phone: None,
            stage: Stage::Start,
            last_message_id: None,
            registration_date: now,
            last_activity: now,
        }
    }

    pub fn apply(&mut self, update: &ProfileUpdate) {
        match update {
            ProfileUpdate::Gender(gender) => self.gender = *gender,
            ProfileUpdate::Name(name) => self.name = Some(name.clone()),
            ProfileUpdate::Phone(phone) => self.phone = Some(phone.as_str().to_string()),
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.first_name.clone())
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// The profile fields the conversation may write. Values are validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    Gender(Gender),
    Name(String),
    Phone(PhoneNumber),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: String,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("product name must not be empty");
        }
        if self.price <= 0 {
            return Err("product price must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    pub fn validate(&self) -> Result<(), &'static str> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err("product name must not be empty");
        }
        if matches!(self.price, Some(price) if price <= 0) {
            return Err("product price must be positive");
        }
        Ok(())
    }

    pub fn apply(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
    }
}

/// One cart line. The unit price is captured when the product is first added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub quantity: u32,
}

impl CartItem {
    /// Saturates instead of overflowing on absurd prices or quantities
    pub fn line_total(&self) -> i64 {
        self.unit_price.saturating_mul(i64::from(self.quantity))
    }
}

/// Sum of line totals, saturating at `i64::MAX`
pub fn saturating_total(lines: impl IntoIterator<Item = i64>) -> i64 {
    lines.into_iter().fold(0_i64, i64::saturating_add)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> i64 {
        saturating_total(self.items.iter().map(CartItem::line_total))
    }

    /// Adds a product, merging with an existing line for the same product
    pub fn add(&mut self, product: &Product, quantity: u32) {
        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => self.items.push(CartItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity,
            }),
        }
    }

    pub fn remove(&mut self, product_id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.items.len() != before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Only pending orders move, and only to a terminal status
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (*self, next),
            (OrderStatus::Pending, OrderStatus::Paid) | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "status-pending",
            OrderStatus::Paid => "status-paid",
            OrderStatus::Cancelled => "status-cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// Frozen order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price.saturating_mul(i64::from(self.quantity))
    }
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
}

impl NewOrder {
    /// A pending order holding a snapshot of the cart lines
    pub fn from_cart(user_id: i64, cart: &Cart) -> Self {
        Self {
            user_id,
            items: cart.items.iter().map(OrderItem::from).collect(),
            status: OrderStatus::Pending,
            payment_reference: None,
        }
    }

    pub fn total_amount(&self) -> i64 {
        saturating_total(self.items.iter().map(OrderItem::line_total))
    }
}

/// Why `/meeting` or `/offer` arguments were refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateArgsError {
    /// Nothing after the command
    Missing,
    /// Fewer `|`-separated parts than the template requires
    TooFew,
}

/// Splits `a | b | c` and checks that the first `required` parts are non-empty
fn split_template_args(args: &str, required: usize) -> Result<Vec<String>, TemplateArgsError> {
    if args.trim().is_empty() {
        return Err(TemplateArgsError::Missing);
    }
    let parts: Vec<String> = args.split('|').map(|part| part.trim().to_string()).collect();
    if parts.len() < required || parts[..required].iter().any(String::is_empty) {
        return Err(TemplateArgsError::TooFew);
    }
    Ok(parts)
}

fn optional_part(parts: &[String], index: usize) -> Option<String> {
    parts.get(index).filter(|part| !part.is_empty()).cloned()
}

/// `/meeting <title> | <description> | <date> | [link]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingInvite {
    pub title: String,
    pub description: String,
    pub date: String,
    pub link: Option<String>,
}

impl MeetingInvite {
    pub fn parse(args: &str) -> Result<Self, TemplateArgsError> {
        let parts = split_template_args(args, 3)?;
        Ok(Self {
            title: parts[0].clone(),
            description: parts[1].clone(),
            date: parts[2].clone(),
            link: optional_part(&parts, 3),
        })
    }
}

/// `/offer <title> | <description> | [discount] | [valid until]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialOffer {
    pub title: String,
    pub description: String,
    pub discount: Option<String>,
    pub valid_until: Option<String>,
}

impl SpecialOffer {
    pub fn parse(args: &str) -> Result<Self, TemplateArgsError> {
        let parts = split_template_args(args, 2)?;
        Ok(Self {
            title: parts[0].clone(),
            description: parts[1].clone(),
            discount: optional_part(&parts, 2),
            valid_until: optional_part(&parts, 3),
        })
    }
}

/// Who a broadcast goes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Audience {
    #[default]
    All,
    /// Active within the last 30 days
    Active,
    /// Registered within the last 7 days
    New,
    Stage(Stage),
}

impl Audience {
    pub const ACTIVE_WITHIN_DAYS: i64 = 30;
    pub const NEW_WITHIN_DAYS: i64 = 7;
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::All => f.write_str("all"),
            Audience::Active => f.write_str("active"),
            Audience::New => f.write_str("new"),
            Audience::Stage(stage) => write!(f, "stage:{stage}"),
        }
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Audience::All),
            "active" => Ok(Audience::Active),
            "new" => Ok(Audience::New),
            other => match other.strip_prefix("stage:") {
                Some(stage) => stage.parse().map(Audience::Stage),
                None => Err(format!("unknown audience '{other}'")),
            },
        }
    }
}

impl TryFrom<String> for Audience {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Audience> for String {
    fn from(audience: Audience) -> Self {
        audience.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub target_audience: Audience,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent && self.scheduled_at.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub target_audience: Audience,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("notification title must not be empty");
        }
        if self.message.trim().is_empty() {
            return Err("notification message must not be empty");
        }
        Ok(())
    }
}
