use std::sync::Arc;
use std::time::Duration;

use crate::error::PaymentError;
use crate::invoice::{FeeContext, Invoice, PaymentResolution};
use crate::manual::ManualChannel;
use crate::poller::InvoiceStatusPoller;
use crate::presenter::InvoicePresenter;
use crate::provider::WalletProvider;
use crate::transport::InvoiceTransport;
use crate::wallet::{WalletAttempt, WalletChannel};

/// Tunables for payment resolution.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Cadence of settlement polling while a wallet payment is pending.
    pub poll_interval: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Top-level coordinator: decides whether payment is required at all,
/// creates the hold invoice, and runs the wallet and manual channels to
/// settle it.
pub struct PaymentOrchestrator {
    transport: Arc<dyn InvoiceTransport>,
    provider: Arc<dyn WalletProvider>,
    presenter: Arc<dyn InvoicePresenter>,
    config: PaymentConfig,
}

impl PaymentOrchestrator {
    #[must_use]
    pub fn new(
        transport: Arc<dyn InvoiceTransport>,
        provider: Arc<dyn WalletProvider>,
        presenter: Arc<dyn InvoicePresenter>,
    ) -> Self {
        Self {
            transport,
            provider,
            presenter,
            config: PaymentConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PaymentConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve payment for a priced action.
    ///
    /// Free actions and balances covering the fee resolve to
    /// [`PaymentResolution::NotRequired`] without any transport call.
    /// Otherwise a fresh hold invoice is created and resolved through
    /// the channel race; the settled invoice is returned, including the
    /// `hash`/`hmac` the caller needs for further references. Errors are
    /// classified at their origin and propagated
    /// unchanged; nothing is retried here.
    pub async fn payment(
        &self,
        fee: FeeContext,
        user_balance_sats: u64,
    ) -> Result<PaymentResolution, PaymentError> {
        if fee.free || user_balance_sats >= fee.total_sats {
            tracing::debug!(
                free = fee.free,
                total_sats = fee.total_sats,
                "payment not required"
            );
            return Ok(PaymentResolution::NotRequired);
        }

        let invoice = self
            .transport
            .create_invoice(fee.total_sats)
            .await
            .map_err(PaymentError::CreateInvoice)?;
        tracing::info!(
            invoice_id = %invoice.id,
            amount_sats = fee.total_sats,
            "created hold invoice"
        );

        self.wait_for_payment(&invoice).await?;
        Ok(PaymentResolution::Paid(invoice))
    }

    /// Run the settlement channels for an already-created invoice.
    ///
    /// The wallet channel goes first; a cancellation from it is final.
    /// When it defers, the manual channel decides, and a cancellation
    /// there carries the wallet failure that forced the handoff as its
    /// error source.
    pub async fn wait_for_payment(&self, invoice: &Invoice) -> Result<(), PaymentError> {
        let wallet = WalletChannel::new(
            Arc::clone(&self.provider),
            InvoiceStatusPoller::new(Arc::clone(&self.transport), self.config.poll_interval),
        );
        let wallet_failure = match wallet.attempt_auto_payment(invoice).await? {
            WalletAttempt::Paid => return Ok(()),
            WalletAttempt::Deferred(cause) => cause,
        };

        let manual = ManualChannel::new(Arc::clone(&self.transport), Arc::clone(&self.presenter));
        match manual.present_and_wait(invoice).await {
            Ok(()) => Ok(()),
            Err(PaymentError::Canceled {
                wallet_failure: None,
            }) => Err(PaymentError::Canceled {
                wallet_failure: wallet_failure.map(Box::new),
            }),
            Err(error) => {
                if let Some(cause) = wallet_failure {
                    tracing::warn!(
                        error = %cause,
                        "wallet-channel failure preceded the manual-channel failure"
                    );
                }
                Err(error)
            }
        }
    }
}
