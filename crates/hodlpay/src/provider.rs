use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider observed the invoice as canceled while paying; no
    /// channel can settle it anymore.
    #[error("invoice canceled before the provider could pay")]
    InvoiceCanceled,

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Optional automated settlement capability, e.g. a browser-resident
/// wallet.
///
/// `send_payment` may never resolve for hold invoices: the funds are held
/// rather than settled, so acknowledgment can be withheld indefinitely.
/// Callers must race it against a status poller instead of awaiting it
/// alone.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether the capability can currently take payments.
    fn enabled(&self) -> bool;

    async fn send_payment(&self, payment_request: &str) -> Result<(), ProviderError>;
}

/// Provider stand-in for environments without an automated wallet.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvider;

#[async_trait]
impl WalletProvider for DisabledProvider {
    fn enabled(&self) -> bool {
        false
    }

    async fn send_payment(&self, _payment_request: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable(
            "wallet provider disabled".to_string(),
        ))
    }
}
