//! Table definitions for the wallet/order store.
//!
//! Monetary columns are stored as canonical decimal strings and parsed into
//! `rust_decimal::Decimal` at the service layer; timestamps are RFC 3339 text.

pub(crate) const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    phone_number    TEXT    NOT NULL UNIQUE,
    full_name       TEXT    NOT NULL,
    wallet_balance  TEXT    NOT NULL DEFAULT '0',
    is_activated    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL
)
"#;

pub(crate) const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    partner_id      INTEGER NOT NULL,
    name            TEXT    NOT NULL,
    price           TEXT    NOT NULL,
    is_available    INTEGER NOT NULL DEFAULT 1
)
"#;

pub(crate) const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id),
    partner_id      INTEGER NOT NULL,
    total_amount    TEXT    NOT NULL,
    status          TEXT    NOT NULL DEFAULT 'pending',
    idempotency_key TEXT    UNIQUE,
    created_at      TEXT    NOT NULL
)
"#;

pub(crate) const CREATE_ORDER_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS order_items (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id        INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    product_id      INTEGER NOT NULL REFERENCES products(id),
    quantity        INTEGER NOT NULL,
    price_per_unit  TEXT    NOT NULL
)
"#;

pub(crate) const CREATE_WALLET_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_transactions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id          INTEGER NOT NULL REFERENCES users(id),
    amount           TEXT    NOT NULL,
    transaction_type TEXT    NOT NULL,
    reference        TEXT,
    description      TEXT    NOT NULL,
    created_at       TEXT    NOT NULL
)
"#;

/// At most one credit per external reference. Peer transfers reuse one
/// reference across a debit/credit pair, so uniqueness is scoped to credits.
pub(crate) const CREATE_WALLET_TRANSACTIONS_REFERENCE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_wallet_transactions_credit_reference
    ON wallet_transactions(reference)
    WHERE reference IS NOT NULL AND transaction_type = 'topup'
"#;

pub(crate) const CREATE_WALLET_TRANSACTIONS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_wallet_transactions_user
    ON wallet_transactions(user_id, created_at)
"#;

pub(crate) const ALL_TABLES: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_PRODUCTS_TABLE,
    CREATE_ORDERS_TABLE,
    CREATE_ORDER_ITEMS_TABLE,
    CREATE_WALLET_TRANSACTIONS_TABLE,
    CREATE_WALLET_TRANSACTIONS_REFERENCE_INDEX,
    CREATE_WALLET_TRANSACTIONS_USER_INDEX,
];
