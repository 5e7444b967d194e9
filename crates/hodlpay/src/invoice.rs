use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hold invoice issued for a priced action.
///
/// `hash` and `hmac` are immutable once issued; possession of `hmac` is
/// the authorization to cancel. The server-side settlement state is never
/// stored here, only observed through [`InvoiceStatus`] queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    /// BOLT11-style payment request handed to payers.
    pub payment_request: String,
    pub hash: String,
    /// Cancellation credential issued alongside the invoice.
    pub hmac: String,
    pub expires_at: DateTime<Utc>,
}

/// Current server-side state of an invoice, as reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatus {
    pub is_held: bool,
    pub sats_received: u64,
    pub cancelled: bool,
}

impl InvoiceStatus {
    /// Funds arrived and are held: terminal success for a hold invoice.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_held && self.sats_received > 0
    }
}

/// Cost of the action a payment resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeContext {
    /// Total amount in sats.
    pub total_sats: u64,
    /// Free actions never require an invoice.
    pub free: bool,
}

/// Result of a [`payment`](crate::PaymentOrchestrator::payment) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResolution {
    /// The action was free or covered by the user's balance; no invoice
    /// was created and no network call was made.
    NotRequired,
    /// The invoice that was created and settled for this action.
    Paid(Invoice),
}

impl PaymentResolution {
    #[must_use]
    pub fn invoice(&self) -> Option<&Invoice> {
        match self {
            Self::NotRequired => None,
            Self::Paid(invoice) => Some(invoice),
        }
    }

    /// Invoice hash, `None` for the no-invoice sentinel.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.invoice().map(|invoice| invoice.hash.as_str())
    }

    /// Cancellation credential, `None` for the no-invoice sentinel.
    #[must_use]
    pub fn hmac(&self) -> Option<&str> {
        self.invoice().map(|invoice| invoice.hmac.as_str())
    }
}
