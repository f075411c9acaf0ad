//! Payment top-up flow
//!
//! Bridges the payment gateway to the wallet ledger: initialize mints a
//! `tx_ref` carrying the user id and opens a hosted checkout; verify asks the
//! gateway server-side whether that reference completed, then credits the
//! wallet at most once per reference.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::gateway::{mint_tx_ref, parse_tx_ref, CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::wallet::{CreditOutcome, WalletService};

#[derive(Clone)]
pub struct PaymentsService {
    gateway: Arc<dyn PaymentGateway>,
    wallets: WalletService,
    currency: String,
    callback_url: String,
}

impl PaymentsService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        wallets: WalletService,
        currency: String,
        callback_url: String,
    ) -> Self {
        Self {
            gateway,
            wallets,
            currency,
            callback_url,
        }
    }

    /// Open a hosted checkout session for a wallet top-up.
    ///
    /// Contact details supplied by the caller take precedence; absent ones
    /// fall back to the stored profile (with a synthesized email).
    pub async fn initialize_topup(
        &self,
        user_id: i64,
        amount: Decimal,
        email: Option<String>,
        full_name: Option<String>,
    ) -> Result<CheckoutSession> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let user = self.wallets.get_user(user_id).await?;

        let tx_ref = mint_tx_ref(user.id);
        let full_name = full_name.unwrap_or_else(|| user.full_name.clone());
        let mut names = full_name.split_whitespace();
        let first_name = names.next().unwrap_or("User").to_string();
        let last_name = names.next().unwrap_or("User").to_string();

        let session = self
            .gateway
            .initialize(&CheckoutRequest {
                amount,
                currency: self.currency.clone(),
                email: email.unwrap_or_else(|| format!("{}@aftadelivery.com", user.id)),
                first_name,
                last_name,
                tx_ref: tx_ref.clone(),
                callback_url: self.callback_url.clone(),
                return_url: None,
            })
            .await?;

        info!(
            user_id = user.id,
            amount = %amount,
            tx_ref = %tx_ref,
            gateway = self.gateway.gateway_id(),
            "Checkout session opened"
        );
        Ok(session)
    }

    /// Verify a checkout reference with the gateway and credit the wallet.
    ///
    /// The gateway's reported amount is what gets credited, never a
    /// client-supplied one. Replays of an already-credited reference return
    /// [`CreditOutcome::AlreadyProcessed`].
    pub async fn verify_topup(&self, tx_ref: &str) -> Result<CreditOutcome> {
        let user_id =
            parse_tx_ref(tx_ref).ok_or_else(|| LedgerError::InvalidReference(tx_ref.to_string()))?;

        let verification = self.gateway.verify(tx_ref).await?;
        if !verification.completed || verification.amount <= Decimal::ZERO {
            warn!(tx_ref = %tx_ref, "Verification did not confirm payment");
            return Err(LedgerError::PaymentNotVerified);
        }

        self.wallets
            .credit_external(
                user_id,
                verification.amount,
                tx_ref,
                &format!("Top-up via Chapa - Ref: {tx_ref}"),
            )
            .await
    }
}
