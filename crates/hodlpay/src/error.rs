use thiserror::Error;

use crate::provider::ProviderError;
use crate::transport::TransportError;

/// Errors surfaced by payment resolution.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The invoice was canceled; no channel can ever pay it.
    #[error("invoice canceled")]
    Canceled {
        /// Wallet-channel failure that forced the manual fallback, when
        /// the wallet channel ran first and handed off.
        #[source]
        wallet_failure: Option<Box<PaymentError>>,
    },

    /// Invoice creation failed; there is no invoice to resolve.
    #[error("invoice creation failed")]
    CreateInvoice(#[source] TransportError),

    /// The wallet provider failed to pay the invoice.
    #[error("wallet provider payment failed")]
    Provider(#[source] ProviderError),

    /// A status or cancel call against the invoice transport failed.
    #[error("invoice transport call failed")]
    Transport(#[source] TransportError),
}

impl PaymentError {
    /// Cancellation with no preceding wallet-channel failure.
    pub(crate) fn canceled() -> Self {
        Self::Canceled {
            wallet_failure: None,
        }
    }

    /// True when the invoice can never be paid.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}
