//! REST API
//!
//! camelCase request bodies and `{success, ...}` response envelopes, matching
//! the mobile client contract. Errors surface through
//! [`LedgerError::into_response`].

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::orders::{OrderLine, OrderRequest, OrdersService};
use crate::payments::PaymentsService;
use crate::types::OrderStatus;
use crate::wallet::{CreditOutcome, WalletService};

#[derive(Clone)]
pub struct AppState {
    pub wallets: WalletService,
    pub orders: OrdersService,
    pub payments: PaymentsService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(health))
        .route("/orders", post(place_order))
        .route("/orders/{id}", get(list_user_orders))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/partner/orders/{id}", get(list_partner_orders))
        .route("/wallet/transfer", post(transfer))
        .route("/wallet/transactions/{id}", get(list_transactions))
        .route("/payment/chapa/init", post(init_payment))
        .route("/payment/chapa/verify/{tx_ref}", get(verify_payment))
        .route("/payment/simulate", post(simulate_payment))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

// ============== Orders ==============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest {
    user_id: i64,
    partner_id: i64,
    total_amount: Decimal,
    items: Vec<OrderLineRequest>,
    idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderLineRequest {
    product_id: i64,
    #[serde(default = "default_quantity")]
    quantity: i64,
    price: Option<Decimal>,
}

fn default_quantity() -> i64 {
    1
}

async fn place_order(
    State(state): State<AppState>,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<Json<Value>> {
    let receipt = state
        .orders
        .place_order(OrderRequest {
            user_id: body.user_id,
            partner_id: body.partner_id,
            total_amount: body.total_amount,
            items: body
                .items
                .into_iter()
                .map(|line| OrderLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
            idempotency_key: body.idempotency_key,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "orderId": receipt.order_id,
        "user": receipt.user,
    })))
}

async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>> {
    let orders = state.orders.list_for_user(user_id).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

async fn list_partner_orders(
    State(state): State<AppState>,
    Path(partner_id): Path<i64>,
) -> Result<Json<Value>> {
    let orders = state.orders.list_for_partner(partner_id).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    let order = state.orders.update_status(order_id, body.status).await?;
    Ok(Json(json!({ "success": true, "order": order })))
}

// ============== Wallet ==============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    sender_id: i64,
    receiver_phone: String,
    amount: Decimal,
}

async fn transfer(
    State(state): State<AppState>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<Value>> {
    let receipt = state
        .wallets
        .transfer(body.sender_id, &body.receiver_phone, body.amount)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Transfer successful",
        "user": receipt.user,
        "txRef": receipt.tx_ref,
    })))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>> {
    let transactions = state.wallets.transactions(user_id, 50).await?;
    Ok(Json(json!({ "success": true, "transactions": transactions })))
}

// ============== Payments ==============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapaInitRequest {
    user_id: i64,
    amount: Decimal,
    email: Option<String>,
    full_name: Option<String>,
}

async fn init_payment(
    State(state): State<AppState>,
    Json(body): Json<ChapaInitRequest>,
) -> Result<Json<Value>> {
    let session = state
        .payments
        .initialize_topup(body.user_id, body.amount, body.email, body.full_name)
        .await?;
    Ok(Json(json!({
        "success": true,
        "checkout_url": session.checkout_url,
        "tx_ref": session.tx_ref,
    })))
}

async fn verify_payment(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<Json<Value>> {
    match state.payments.verify_topup(&tx_ref).await? {
        CreditOutcome::Credited(user) => Ok(Json(json!({
            "success": true,
            "message": "Payment Verified & Wallet Updated",
            "user": user,
        }))),
        CreditOutcome::AlreadyProcessed => Ok(Json(json!({
            "success": true,
            "message": "Already processed",
            "user": null,
        }))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateRequest {
    user_id: i64,
    amount: Decimal,
    #[serde(default = "default_provider")]
    provider: String,
}

fn default_provider() -> String {
    "Telebirr".to_string()
}

async fn simulate_payment(
    State(state): State<AppState>,
    Json(body): Json<SimulateRequest>,
) -> Result<Json<Value>> {
    let user = state
        .wallets
        .simulate_topup(body.user_id, body.amount, &body.provider)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Payment Successful",
        "user": user,
    })))
}
