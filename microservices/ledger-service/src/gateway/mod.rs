//! Payment gateway adapter (Chapa)

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Checkout initialization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    pub return_url: Option<String>,
}

/// Hosted checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Server-side verification result for one transaction reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub reference: String,
    /// True only for a successful, completed payment
    pub completed: bool,
    pub amount: Decimal,
}

/// Payment gateway trait
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn gateway_id(&self) -> &'static str;
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;
    async fn verify(&self, tx_ref: &str) -> Result<GatewayVerification, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
}

/// Mint a transaction reference embedding the user id (`afta_<millis>_<id>`).
pub fn mint_tx_ref(user_id: i64) -> String {
    format!("afta_{}_{}", Utc::now().timestamp_millis(), user_id)
}

/// Recover the user id from a minted reference.
pub fn parse_tx_ref(tx_ref: &str) -> Option<i64> {
    let mut parts = tx_ref.split('_');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("afta"), Some(_), Some(user_id), None) => user_id.parse().ok(),
        _ => None,
    }
}

// ============== Chapa Gateway ==============

pub struct ChapaGateway {
    secret_key: String,
    api_url: String,
    http_client: reqwest::Client,
}

impl ChapaGateway {
    pub fn new(secret_key: String, api_url: String) -> Self {
        Self {
            secret_key,
            api_url,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PaymentGateway for ChapaGateway {
    fn gateway_id(&self) -> &'static str {
        "chapa"
    }

    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let payload = json!({
            "amount": request.amount.to_string(),
            "currency": request.currency,
            "email": request.email,
            "first_name": request.first_name,
            "last_name": request.last_name,
            "tx_ref": request.tx_ref,
            "callback_url": request.callback_url,
            "return_url": request.return_url,
            "customization": {
                "title": "Afta Wallet Top-up",
                "description": format!("Top up wallet with {} {}", request.amount, request.currency)
            }
        });

        let response = self
            .http_client
            .post(format!("{}/transaction/initialize", self.api_url))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Api(e.to_string()))?;

        if result["status"].as_str() != Some("success") {
            return Err(GatewayError::Api(
                result["message"].as_str().unwrap_or("Unknown error").to_string(),
            ));
        }

        Ok(CheckoutSession {
            checkout_url: result["data"]["checkout_url"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            tx_ref: request.tx_ref.clone(),
        })
    }

    async fn verify(&self, tx_ref: &str) -> Result<GatewayVerification, GatewayError> {
        let response = self
            .http_client
            .get(format!("{}/transaction/verify/{}", self.api_url, tx_ref))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Api(e.to_string()))?;

        let completed = result["status"].as_str() == Some("success")
            && result["data"]["status"].as_str() == Some("success");

        Ok(GatewayVerification {
            reference: tx_ref.to_string(),
            completed,
            amount: decode_amount(&result["data"]["amount"]),
        })
    }
}

/// Chapa reports amounts as either a JSON number or a numeric string.
fn decode_amount(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::String(s) => s.parse().unwrap_or_default(),
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(|f| Decimal::try_from(f).ok())
            .unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

// ============== Mock Gateway (tests) ==============
