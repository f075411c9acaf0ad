//! Order Service
//!
//! Order placement is an atomic compound operation: recompute the total from
//! current catalog prices, debit the buyer's wallet, persist the order with
//! per-line price snapshots. All of it inside one immediate transaction, so a
//! failed order leaves no trace in any table.

use afta_store::{begin_immediate, commit, rollback, SqliteConnection, Store};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::types::{Order, OrderItem, OrderStatus, TransactionKind, User};
use crate::wallet;

/// One requested order line. `price` is the client's display hint; the
/// catalog price is authoritative.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i64,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub user_id: i64,
    pub partner_id: i64,
    /// Total the client expects to pay, checked against the recomputed total
    pub total_amount: Decimal,
    pub items: Vec<OrderLine>,
    /// Optional client-supplied key for safe retries
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: i64,
    /// Buyer snapshot after the debit
    pub user: User,
    /// True when the key matched an earlier order and no new charge was made
    pub replayed: bool,
}

#[derive(Clone)]
pub struct OrdersService {
    store: Store,
}

impl OrdersService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Place an order, charging the buyer's wallet for the recomputed total.
    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderReceipt> {
        if request.items.is_empty() {
            return Err(LedgerError::InvalidAmount);
        }
        if request.items.iter().any(|line| line.quantity <= 0) {
            return Err(LedgerError::InvalidAmount);
        }

        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = Self::place_order_in_tx(&mut conn, &request).await;

        match result {
            Ok(receipt) => {
                commit(&mut conn).await?;
                if receipt.replayed {
                    info!(order_id = receipt.order_id, "Order replayed by idempotency key");
                } else {
                    info!(
                        order_id = receipt.order_id,
                        user_id = request.user_id,
                        partner_id = request.partner_id,
                        "Order placed"
                    );
                }
                Ok(receipt)
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    async fn place_order_in_tx(
        conn: &mut SqliteConnection,
        request: &OrderRequest,
    ) -> Result<OrderReceipt> {
        if let Some(key) = request.idempotency_key.as_deref() {
            let existing = sqlx::query("SELECT id FROM orders WHERE idempotency_key = ?")
                .bind(key)
                .fetch_optional(&mut *conn)
                .await?;
            if let Some(row) = existing {
                use afta_store::Row;
                let order_id: i64 = row.get("id");
                let user = wallet::fetch_user(conn, request.user_id)
                    .await?
                    .ok_or(LedgerError::UserNotFound)?;
                return Ok(OrderReceipt {
                    order_id,
                    user,
                    replayed: true,
                });
            }
        }

        // Price every line from the catalog; the client total is only a
        // consistency check against stale menus.
        let mut total = Decimal::ZERO;
        let mut priced_lines = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let unit_price = fetch_available_price(conn, line.product_id)
                .await?
                .ok_or(LedgerError::UnknownProduct(line.product_id))?;
            if let Some(hint) = line.price {
                if hint != unit_price {
                    debug!(
                        product_id = line.product_id,
                        client_price = %hint,
                        catalog_price = %unit_price,
                        "Client price hint differs from catalog"
                    );
                }
            }
            total += unit_price * Decimal::from(line.quantity);
            priced_lines.push((line.product_id, line.quantity, unit_price));
        }

        if total != request.total_amount {
            return Err(LedgerError::PriceMismatch {
                client: request.total_amount,
                actual: total,
            });
        }

        let insert = sqlx::query(
            "INSERT INTO orders \
             (user_id, partner_id, total_amount, status, idempotency_key, created_at) \
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(request.user_id)
        .bind(request.partner_id)
        .bind(total.to_string())
        .bind(request.idempotency_key.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        let order_id = insert.last_insert_rowid();

        for (product_id, quantity, unit_price) in &priced_lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, price_per_unit) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .bind(unit_price.to_string())
            .execute(&mut *conn)
            .await?;
        }

        wallet::apply_entry(
            conn,
            request.user_id,
            -total,
            TransactionKind::Payment,
            None,
            &format!("Order #{order_id}"),
        )
        .await?;

        let user = wallet::fetch_user(conn, request.user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)?;

        Ok(OrderReceipt {
            order_id,
            user,
            replayed: false,
        })
    }

    /// Fetch one order with its items.
    pub async fn get(&self, order_id: i64) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(self.store.pool())
            .await?;
        let mut order = match row {
            Some(row) => Order::from_row(&row)?,
            None => return Err(LedgerError::OrderNotFound),
        };
        order.items = self.items_for(order_id).await?;
        Ok(order)
    }

    /// A user's orders, newest first, items included.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;
        self.hydrate(rows).await
    }

    /// A partner's incoming orders, newest first, items included.
    pub async fn list_for_partner(&self, partner_id: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE partner_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(partner_id)
        .fetch_all(self.store.pool())
        .await?;
        self.hydrate(rows).await
    }

    /// Advance an order's status, rejecting transitions outside the
    /// lifecycle.
    pub async fn update_status(&self, order_id: i64, to: OrderStatus) -> Result<Order> {
        let mut conn = self.store.acquire().await?;
        begin_immediate(&mut conn).await?;

        let result = async {
            let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
                .bind(order_id)
                .fetch_optional(&mut *conn)
                .await?;
            let order = match row {
                Some(row) => Order::from_row(&row)?,
                None => return Err(LedgerError::OrderNotFound),
            };
            if !order.status.can_transition(to) {
                return Err(LedgerError::InvalidStatusTransition {
                    from: order.status,
                    to,
                });
            }
            sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
                .bind(to.as_str())
                .bind(order_id)
                .execute(&mut *conn)
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                commit(&mut conn).await?;
                // Release the connection before the read-back; holding it
                // while get() acquires a second one starves the pool.
                drop(conn);
                info!(order_id = order_id, status = %to, "Order status updated");
                self.get(order_id).await
            }
            Err(e) => {
                let _ = rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    async fn hydrate(&self, rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = Order::from_row(row)?;
            order.items = self.items_for(order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn items_for(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(self.store.pool())
            .await?;
        rows.iter()
            .map(|row| OrderItem::from_row(row).map_err(Into::into))
            .collect()
    }
}

/// Unit price of a product, or `None` when the product is missing or
/// currently unavailable.
async fn fetch_available_price(
    conn: &mut SqliteConnection,
    product_id: i64,
) -> Result<Option<Decimal>> {
    let row = sqlx::query("SELECT price FROM products WHERE id = ? AND is_available = 1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => {
            let price = crate::types::decimal_column(&row, "price")?;
            Ok(Some(price))
        }
        None => Ok(None),
    }
}
