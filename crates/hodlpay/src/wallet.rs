use std::sync::Arc;

use crate::error::PaymentError;
use crate::invoice::Invoice;
use crate::poller::InvoiceStatusPoller;
use crate::provider::{ProviderError, WalletProvider};

/// Outcome of the wallet channel's attempt at automated settlement.
#[derive(Debug)]
pub enum WalletAttempt {
    /// Settlement confirmed, by the provider or by the poller.
    Paid,
    /// The wallet channel could not resolve the invoice; manual
    /// presentation takes over. Carries the failure that forced the
    /// handoff, when there was one.
    Deferred(Option<PaymentError>),
}

/// Automated settlement channel.
///
/// Races the provider's send against the status poller, because a hold
/// invoice's provider call may legitimately never resolve on its own.
pub struct WalletChannel {
    provider: Arc<dyn WalletProvider>,
    poller: InvoiceStatusPoller,
}

impl WalletChannel {
    #[must_use]
    pub fn new(provider: Arc<dyn WalletProvider>, poller: InvoiceStatusPoller) -> Self {
        Self { provider, poller }
    }

    /// Attempt automated settlement of `invoice`.
    ///
    /// The first terminal outcome wins; the losing arm is dropped, which
    /// stops its timer and prevents any further queries or sends. A
    /// cancellation observed by either arm is terminal: a canceled
    /// invoice cannot be paid by any channel, so there is no manual
    /// fallback for it.
    pub async fn attempt_auto_payment(
        &self,
        invoice: &Invoice,
    ) -> Result<WalletAttempt, PaymentError> {
        if !self.provider.enabled() {
            return Ok(WalletAttempt::Deferred(None));
        }

        tracing::debug!(invoice_id = %invoice.id, "attempting wallet settlement");
        tokio::select! {
            sent = self.provider.send_payment(&invoice.payment_request) => match sent {
                Ok(()) => {
                    tracing::info!(invoice_id = %invoice.id, "wallet provider confirmed payment");
                    Ok(WalletAttempt::Paid)
                }
                Err(ProviderError::InvoiceCanceled) => Err(PaymentError::canceled()),
                Err(error) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        error = %error,
                        "wallet provider failed, deferring to manual settlement"
                    );
                    Ok(WalletAttempt::Deferred(Some(PaymentError::Provider(error))))
                }
            },
            polled = self.poller.poll_until_settled(&invoice.id) => match polled {
                Ok(()) => Ok(WalletAttempt::Paid),
                Err(error) if error.is_canceled() => Err(error),
                Err(error) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        error = %error,
                        "status polling failed, deferring to manual settlement"
                    );
                    Ok(WalletAttempt::Deferred(Some(error)))
                }
            },
        }
    }
}
