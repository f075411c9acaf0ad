//! Immediate-transaction helpers.
//!
//! Every mutating operation in the platform runs inside one of these
//! transactions: acquire a connection, `begin_immediate`, do the locking
//! reads and writes, then `commit` or `rollback`. BEGIN IMMEDIATE takes the
//! write lock up front, so concurrent DEFERRED transactions can never race
//! to upgrade from shared to exclusive and deadlock.

use sqlx::SqliteConnection;

use crate::Result;

pub async fn begin_immediate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("BEGIN IMMEDIATE").execute(conn).await?;
    Ok(())
}

pub async fn commit(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("COMMIT").execute(conn).await?;
    Ok(())
}

pub async fn rollback(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("ROLLBACK").execute(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PoolConfig, Store};

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = Store::connect(&PoolConfig::in_memory()).await.unwrap();

        let mut conn = store.acquire().await.unwrap();
        begin_immediate(&mut conn).await.unwrap();
        sqlx::query("INSERT INTO users (phone_number, full_name, wallet_balance, created_at) VALUES ('0911', 'A', '0', '2024-01-01T00:00:00Z')")
            .execute(&mut *conn)
            .await
            .unwrap();
        rollback(&mut conn).await.unwrap();
        drop(conn);

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn commit_persists_writes() {
        let store = Store::connect(&PoolConfig::in_memory()).await.unwrap();

        let mut conn = store.acquire().await.unwrap();
        begin_immediate(&mut conn).await.unwrap();
        sqlx::query("INSERT INTO users (phone_number, full_name, wallet_balance, created_at) VALUES ('0911', 'A', '0', '2024-01-01T00:00:00Z')")
            .execute(&mut *conn)
            .await
            .unwrap();
        commit(&mut conn).await.unwrap();
        drop(conn);

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
