//! Ledger Types

use std::fmt;
use std::str::FromStr;

use afta_store::{Row, StoreError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;

/// User account with its wallet balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone_number: String,
    pub full_name: String,
    pub wallet_balance: Decimal,
    pub is_activated: bool,
    pub created_at: DateTime<Utc>,
}

/// One immutable balance change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub transaction_type: TransactionKind,
    pub reference: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Outgoing funds (order debit, transfer out)
    Payment,
    /// Incoming funds (gateway credit, transfer in)
    Topup,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Payment => "payment",
            TransactionKind::Topup => "topup",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(TransactionKind::Payment),
            "topup" => Ok(TransactionKind::Topup),
            other => Err(StoreError::Corrupt(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// Placed order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub partner_id: i64,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Order line with the unit price snapshot taken at purchase time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub price_per_unit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    Ready,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Returns valid next states from the current state.
    pub fn valid_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Accepted, Cancelled],
            Accepted => &[Preparing, Cancelled],
            Preparing => &[Ready, Shipping, Cancelled],
            Ready => &[Shipping, Delivered, Cancelled],
            Shipping => &[Delivered],
            Delivered => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: OrderStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "shipping" => Ok(OrderStatus::Shipping),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(StoreError::Corrupt(format!("unknown order status: {other}"))),
        }
    }
}

// Row decoding for the decimal-as-text / rfc3339-as-text storage convention.

pub(crate) fn decimal_column(row: &SqliteRow, name: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.get(name);
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("bad decimal in {name}: {raw}")))
}

pub(crate) fn datetime_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.get(name);
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("bad timestamp in {name}: {raw}")))
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get("id"),
            phone_number: row.get("phone_number"),
            full_name: row.get("full_name"),
            wallet_balance: decimal_column(row, "wallet_balance")?,
            is_activated: row.get::<i64, _>("is_activated") != 0,
            created_at: datetime_column(row, "created_at")?,
        })
    }
}

impl WalletTransaction {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            amount: decimal_column(row, "amount")?,
            transaction_type: row.get::<String, _>("transaction_type").parse()?,
            reference: row.get("reference"),
            description: row.get("description"),
            created_at: datetime_column(row, "created_at")?,
        })
    }
}

impl Order {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            partner_id: row.get("partner_id"),
            total_amount: decimal_column(row, "total_amount")?,
            status: row.get::<String, _>("status").parse()?,
            created_at: datetime_column(row, "created_at")?,
            items: Vec::new(),
        })
    }
}

impl OrderItem {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get("id"),
            order_id: row.get("order_id"),
            product_id: row.get("product_id"),
            quantity: row.get("quantity"),
            price_per_unit: decimal_column(row, "price_per_unit")?,
        })
    }
}
