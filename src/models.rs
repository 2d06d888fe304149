use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// String-backed enums: serde names, SQL text columns and `FromStr` all
/// share one spelling table.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$name>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

// ===== Catalog =====

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub url: String,
    #[serde(default)]
    pub asset_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub images: Vec<ProductImage>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub in_stock: bool,
    pub stock_qty: i64,
    /// Derived from `in_stock` and `stock_qty` whenever a row is read.
    pub available: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub fn is_available(in_stock: bool, stock_qty: i64) -> bool {
    in_stock && stock_qty > 0
}

impl Product {
    pub fn is_available(&self) -> bool {
        is_available(self.in_stock, self.stock_qty)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateProduct {
    pub title: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub images: Vec<ProductImage>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub in_stock: Option<bool>,
    pub stock_qty: Option<i64>,
}

/// Partial product update; absent fields keep their stored value.
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProduct {
    pub title: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub images: Option<Vec<ProductImage>>,
    pub sizes: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub in_stock: Option<bool>,
    pub stock_qty: Option<i64>,
}

/// Result of an update along with what availability looked like before it.
#[derive(Debug, Clone)]
pub struct UpdatedProduct {
    pub product: Product,
    pub was_available: bool,
}

// ===== Users =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

text_enum!(Role, "role", {
    Customer => "customer",
    Admin => "admin",
});

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUser {
    pub name: String,
    pub email: Option<String>,
}

// ===== Orders =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingWhatsapp,
    Confirmed,
    InProgress,
    Ready,
    Delivered,
    Cancelled,
}

text_enum!(OrderStatus, "order status", {
    PendingWhatsapp => "pending_whatsapp",
    Confirmed => "confirmed",
    InProgress => "in_progress",
    Ready => "ready",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `next` is an edge of the fulfilment graph. Updates are not
    /// rejected on this; it only drives the off-graph warning.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (PendingWhatsapp, Confirmed) => true,
            (Confirmed, InProgress) => true,
            (InProgress, Ready) => true,
            (Ready, Delivered) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Delivery,
    Standard,
    Express,
    Pickup,
}

text_enum!(DeliveryMethod, "delivery method", {
    Delivery => "delivery",
    Standard => "standard",
    Express => "express",
    Pickup => "pickup",
});

impl DeliveryMethod {
    pub fn requires_address(&self) -> bool {
        !matches!(self, DeliveryMethod::Pickup)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub method: DeliveryMethod,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub title: String,
    pub price: f64,
    pub qty: i64,
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Bespoke tailoring request attached to an order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomOrder {
    pub style_type: Option<String>,
    pub fabric: Option<String>,
    pub measurements: BTreeMap<String, serde_json::Value>,
    pub reference_images: Vec<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub method: String,
    pub paid: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_code: String,
    pub user_id: Option<i64>,
    pub customer: Customer,
    pub delivery: Delivery,
    pub items: Vec<OrderItem>,
    pub custom_order: Option<CustomOrder>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub payment: Payment,
    pub created_at: String,
    pub updated_at: String,
}

// Checkout payload. Everything is optional at this layer so that missing
// fields come back as field-level validation errors instead of a parse failure.

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutCustomer {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutDelivery {
    pub method: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutItem {
    pub product_id: Option<i64>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub qty: Option<i64>,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrder {
    pub customer: CheckoutCustomer,
    pub delivery: CheckoutDelivery,
    pub items: Vec<CheckoutItem>,
    pub custom_order: Option<CustomOrder>,
    pub subtotal: Option<f64>,
    pub delivery_fee: Option<f64>,
    pub total: Option<f64>,
}

/// Status change body. The value stays untyped here so that a number,
/// `null` or a missing key is reported as an invalid status.
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UpdateOrderStatus {
    pub status: Option<serde_json::Value>,
}

impl UpdateOrderStatus {
    pub fn requested(self) -> Result<String, AppError> {
        match self.status {
            Some(serde_json::Value::String(status)) => Ok(status),
            Some(other) => Err(AppError::InvalidStatus(other.to_string())),
            None => Err(AppError::InvalidStatus("(missing)".to_string())),
        }
    }
}

// ===== Stock alerts =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Sent,
    Cancelled,
}

text_enum!(AlertStatus, "alert status", {
    Pending => "pending",
    Sent => "sent",
    Cancelled => "cancelled",
});

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub id: i64,
    pub product_id: i64,
    pub user_id: i64,
    pub email: String,
    pub status: AlertStatus,
    pub created_at: String,
    pub sent_at: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SubscribeOutcome {
    Subscribed(StockAlert),
    AlreadySubscribed(StockAlert),
}

impl SubscribeOutcome {
    pub fn alert(&self) -> &StockAlert {
        match self {
            SubscribeOutcome::Subscribed(alert) | SubscribeOutcome::AlreadySubscribed(alert) => {
                alert
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubscribeOutcome::Subscribed(_) => "We'll email you when it's back in stock",
            SubscribeOutcome::AlreadySubscribed(_) => "You're already on the list",
        }
    }
}

/// Tally of one restock fan-out run. `skipped` counts rows that were
/// cancelled or already sent by the time the run reached them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

// ===== Contact & newsletter =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    Replied,
    Closed,
}

text_enum!(ContactStatus, "contact status", {
    New => "new",
    Replied => "replied",
    Closed => "closed",
});

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: String,
    pub status: ContactStatus,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateContactMessage {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateContactStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterSubscriber {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewsletterSignup {
    #[serde(default)]
    pub email: String,
}
