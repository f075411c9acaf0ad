//! Afta Store
//!
//! Embedded relational store for Afta services, backed by SQLite via sqlx.
//! Provides connection pooling, schema bootstrap, and immediate-transaction
//! helpers for the wallet/order tables.

mod error;
mod pool;
mod schema;
mod tx;

pub use error::{Result, StoreError};
pub use pool::{PoolConfig, Store};
pub use tx::{begin_immediate, commit, rollback};

/// Re-export sqlx types the services work with directly
pub use sqlx::pool::PoolConnection;
pub use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
