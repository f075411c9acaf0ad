//! Wallet Service
//!
//! Wallet balances with an append-only transaction ledger. Every balance
//! change goes through [`apply_entry`] inside an immediate transaction, so
//! the sum of a user's ledger entries always equals the stored balance.

use afta_store::{begin_immediate, commit, rollback, SqliteConnection, Store};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::types::{TransactionKind, User, WalletTransaction};

/// Outcome of an external payment credit
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    /// The wallet was credited; carries the updated user snapshot
    Credited(User),
    /// The reference was already credited earlier; nothing changed
    AlreadyProcessed,
}

/// Result of a successful peer transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// Updated sender snapshot
    pub user: User,
    /// Reference shared by both ledger entries
    pub tx_ref: String,
}

#[derive(Clone)]
pub struct WalletService {
    store: Store,
}

impl WalletService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a user with a starting balance.
    ///
    /// A positive starting balance is recorded as an `Initial deposit` ledger
    /// entry so the ledger sums to the balance from the first row on.
    pub async fn create_user(
        &self,
        phone_number: &str,
        full_name: &str,
        starting_balance: Decimal,
    ) -> Result<User> {
        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = async {
            let insert = sqlx::query(
                "INSERT INTO users (phone_number, full_name, wallet_balance, created_at) \
                 VALUES (?, ?, '0', ?)",
            )
            .bind(phone_number)
            .bind(full_name)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await?;
            let user_id = insert.last_insert_rowid();

            if starting_balance > Decimal::ZERO {
                apply_entry(
                    &mut conn,
                    user_id,
                    starting_balance,
                    TransactionKind::Topup,
                    None,
                    "Initial deposit",
                )
                .await?;
            }

            fetch_user(&mut conn, user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)
        }
        .await;

        match result {
            Ok(user) => {
                commit(&mut conn).await?;
                info!(user_id = user.id, phone = %user.phone_number, "User created");
                Ok(user)
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    /// Flip the wallet activation flag.
    pub async fn activate(&self, user_id: i64) -> Result<User> {
        let updated = sqlx::query("UPDATE users SET is_activated = 1 WHERE id = ?")
            .bind(user_id)
            .execute(self.store.pool())
            .await?;
        if updated.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound);
        }
        self.get_user(user_id).await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.store.pool())
            .await?;
        match row {
            Some(row) => Ok(User::from_row(&row)?),
            None => Err(LedgerError::UserNotFound),
        }
    }

    /// Move `amount` from a sender wallet to the wallet behind
    /// `receiver_phone`, atomically, logging a debit/credit pair that shares
    /// one `TRF-` reference.
    pub async fn transfer(
        &self,
        sender_id: i64,
        receiver_phone: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = Self::transfer_in_tx(&mut conn, sender_id, receiver_phone, amount).await;

        match result {
            Ok(receipt) => {
                commit(&mut conn).await?;
                info!(
                    sender_id = sender_id,
                    receiver_phone = %receiver_phone,
                    amount = %amount,
                    reference = %receipt.tx_ref,
                    "Transfer applied"
                );
                Ok(receipt)
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    async fn transfer_in_tx(
        conn: &mut SqliteConnection,
        sender_id: i64,
        receiver_phone: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let sender = fetch_user(conn, sender_id)
            .await?
            .ok_or(LedgerError::SenderNotFound)?;
        if sender.wallet_balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }

        let receiver = fetch_user_by_phone(conn, receiver_phone)
            .await?
            .ok_or(LedgerError::ReceiverNotFound)?;
        if receiver.id == sender.id {
            return Err(LedgerError::SelfTransfer);
        }

        let reference = format!("TRF-{}", Uuid::new_v4());

        apply_entry(
            conn,
            sender.id,
            -amount,
            TransactionKind::Payment,
            Some(&reference),
            &format!(
                "Transfer to {} ({}) - Ref: {}",
                receiver.full_name, receiver.phone_number, reference
            ),
        )
        .await?;

        apply_entry(
            conn,
            receiver.id,
            amount,
            TransactionKind::Topup,
            Some(&reference),
            &format!(
                "Transfer from {} ({}) - Ref: {}",
                sender.full_name, sender.phone_number, reference
            ),
        )
        .await?;

        let updated = fetch_user(conn, sender.id)
            .await?
            .ok_or(LedgerError::SenderNotFound)?;

        Ok(TransferReceipt {
            user: updated,
            tx_ref: reference,
        })
    }

    /// Credit a wallet for a verified external payment, at most once per
    /// reference. A duplicate reference collides with the ledger's unique
    /// credit-reference index and reports [`CreditOutcome::AlreadyProcessed`].
    pub async fn credit_external(
        &self,
        user_id: i64,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> Result<CreditOutcome> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = async {
            fetch_user(&mut conn, user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)?;
            apply_entry(
                &mut conn,
                user_id,
                amount,
                TransactionKind::Topup,
                Some(reference),
                description,
            )
            .await?;
            fetch_user(&mut conn, user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)
        }
        .await;

        match result {
            Ok(user) => {
                commit(&mut conn).await?;
                info!(
                    user_id = user_id,
                    amount = %amount,
                    reference = %reference,
                    "Wallet credited"
                );
                Ok(CreditOutcome::Credited(user))
            }
            Err(LedgerError::Storage(e)) if e.is_unique_violation() => {
                let _ = rollback(&mut conn).await;
                info!(reference = %reference, "Credit already processed");
                Ok(CreditOutcome::AlreadyProcessed)
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    /// Mock top-up without gateway contact. Carries no reference, so it is
    /// deliberately not idempotent; dev/test only.
    pub async fn simulate_topup(
        &self,
        user_id: i64,
        amount: Decimal,
        provider: &str,
    ) -> Result<User> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = async {
            fetch_user(&mut conn, user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)?;
            apply_entry(
                &mut conn,
                user_id,
                amount,
                TransactionKind::Topup,
                None,
                &format!("Top-up via {} (Simulated)", provider),
            )
            .await?;
            fetch_user(&mut conn, user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)
        }
        .await;

        match result {
            Ok(user) => {
                commit(&mut conn).await?;
                info!(user_id = user_id, amount = %amount, provider = %provider, "Simulated top-up");
                Ok(user)
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    /// List a user's ledger entries, newest first.
    pub async fn transactions(&self, user_id: i64, limit: i64) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM wallet_transactions WHERE user_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.store.pool())
        .await?;

        rows.iter()
            .map(|row| WalletTransaction::from_row(row).map_err(Into::into))
            .collect()
    }
}

/// The wallet balance mutation primitive.
///
/// Applies a signed delta to the balance and appends exactly one ledger
/// entry. Must only be called inside an open immediate transaction; if that
/// transaction rolls back, neither the balance change nor the entry survives.
pub(crate) async fn apply_entry(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
    kind: TransactionKind,
    reference: Option<&str>,
    description: &str,
) -> Result<()> {
    let user = fetch_user(conn, user_id)
        .await?
        .ok_or(LedgerError::UserNotFound)?;

    let new_balance = user.wallet_balance + amount;
    if new_balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds);
    }

    sqlx::query("UPDATE users SET wallet_balance = ? WHERE id = ?")
        .bind(new_balance.to_string())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO wallet_transactions \
         (user_id, amount, transaction_type, reference, description, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(amount.to_string())
    .bind(kind.as_str())
    .bind(reference)
    .bind(description)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    debug!(user_id = user_id, amount = %amount, kind = %kind, "Ledger entry applied");
    Ok(())
}

pub(crate) async fn fetch_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| User::from_row(&r)).transpose().map_err(Into::into)
}

async fn fetch_user_by_phone(
    conn: &mut SqliteConnection,
    phone_number: &str,
) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE phone_number = ?")
        .bind(phone_number)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| User::from_row(&r)).transpose().map_err(Into::into)
}
