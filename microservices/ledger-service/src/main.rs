//! Afta Ledger Service
//!
//! Wallet ledger and order transaction service: order placement with wallet
//! debit, peer-to-peer transfers, and idempotent Chapa top-up credits.

mod api;
mod error;
mod gateway;
mod orders;
mod payments;
mod types;
mod wallet;

#[cfg(test)]
mod tests;

pub use error::{LedgerError, Result};
pub use types::{Order, OrderItem, OrderStatus, TransactionKind, User, WalletTransaction};

use std::sync::Arc;
use std::time::Instant;

use afta_core::{AftaError, AftaService, DependencyStatus, HealthStatus, ReadinessStatus, ServiceRuntime};
use afta_store::{PoolConfig, Store};
use async_trait::async_trait;
use tracing::info;

use crate::api::AppState;
use crate::gateway::ChapaGateway;
use crate::orders::OrdersService;
use crate::payments::PaymentsService;
use crate::wallet::WalletService;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub http_bind: String,
    pub chapa_secret_key: String,
    pub chapa_api_url: String,
    pub callback_url: String,
    pub currency: String,
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            chapa_secret_key: std::env::var("CHAPA_SECRET_KEY")
                .unwrap_or_else(|_| "CHASECK_TEST-placeholder".to_string()),
            chapa_api_url: std::env::var("CHAPA_API_URL")
                .unwrap_or_else(|_| "https://api.chapa.co/v1".to_string()),
            callback_url: std::env::var("CALLBACK_URL")
                .unwrap_or_else(|_| "https://afta.example.com/payment/callback".to_string()),
            currency: std::env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "ETB".to_string()),
        }
    }
}

pub struct LedgerService {
    config: LedgerConfig,
    store: Store,
    wallets: WalletService,
    orders: OrdersService,
    payments: PaymentsService,
    start_time: Instant,
}

impl LedgerService {
    pub async fn new() -> afta_core::Result<Self> {
        let config = LedgerConfig::from_env();

        let store = Store::connect(&PoolConfig::from_env())
            .await
            .map_err(|e| AftaError::Database(e.to_string()))?;

        let wallets = WalletService::new(store.clone());
        let orders = OrdersService::new(store.clone());
        let gateway = Arc::new(ChapaGateway::new(
            config.chapa_secret_key.clone(),
            config.chapa_api_url.clone(),
        ));
        let payments = PaymentsService::new(
            gateway,
            wallets.clone(),
            config.currency.clone(),
            config.callback_url.clone(),
        );

        Ok(Self {
            config,
            store,
            wallets,
            orders,
            payments,
            start_time: Instant::now(),
        })
    }
}

#[async_trait]
impl AftaService for LedgerService {
    fn service_id(&self) -> &'static str {
        "ledger-service"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        let started = Instant::now();
        let available = self.store.is_healthy().await;
        ReadinessStatus {
            ready: available,
            dependencies: vec![DependencyStatus {
                name: "store".to_string(),
                available,
                latency_ms: Some(started.elapsed().as_millis() as u64),
            }],
        }
    }

    async fn shutdown(&self) -> afta_core::Result<()> {
        info!("Ledger service shutting down");
        Ok(())
    }

    async fn start(&self) -> afta_core::Result<()> {
        let state = AppState {
            wallets: self.wallets.clone(),
            orders: self.orders.clone(),
            payments: self.payments.clone(),
        };
        let router = api::create_router(state);

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        info!(bind = %self.config.http_bind, "Ledger service listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| AftaError::Network(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> afta_core::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ledger_service=debug")),
        )
        .init();

    let service = Arc::new(LedgerService::new().await?);
    ServiceRuntime::run(service).await
}
