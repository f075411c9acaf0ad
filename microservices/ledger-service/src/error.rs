//! Error taxonomy for the ledger service.
//!
//! Every named failure maps to an HTTP status and a `{success: false, error}`
//! JSON body. A failure always means zero wallet/order mutation took effect.

use afta_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::types::OrderStatus;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("User not found")]
    UserNotFound,

    #[error("Sender not found")]
    SenderNotFound,

    #[error("Receiver not found with this phone number")]
    ReceiverNotFound,

    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Unknown product: {0}")]
    UnknownProduct(i64),

    #[error("Order total {client} does not match current prices ({actual})")]
    PriceMismatch { client: Decimal, actual: Decimal },

    #[error("Order not found")]
    OrderNotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment not verified")]
    PaymentNotVerified,

    #[error("Invalid transaction reference: {0}")]
    InvalidReference(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(StoreError::from(e))
    }
}

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientFunds
            | Self::InvalidAmount
            | Self::SelfTransfer
            | Self::PriceMismatch { .. }
            | Self::InvalidStatusTransition { .. }
            | Self::PaymentNotVerified
            | Self::InvalidReference(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound
            | Self::SenderNotFound
            | Self::ReceiverNotFound
            | Self::UnknownProduct(_)
            | Self::OrderNotFound => StatusCode::NOT_FOUND,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Storage(_)) {
            tracing::error!(error = %self, "Request failed on storage");
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}
