use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::error::PaymentError;
use crate::transport::InvoiceTransport;

/// Polls invoice status at a fixed cadence until a terminal state.
///
/// The future returned by [`poll_until_settled`](Self::poll_until_settled)
/// owns its ticker: dropping it (for example when it loses a `select!`
/// race) stops the polling, so no exit path can leak the timer or issue
/// further queries.
pub struct InvoiceStatusPoller {
    transport: Arc<dyn InvoiceTransport>,
    interval: Duration,
}

impl InvoiceStatusPoller {
    #[must_use]
    pub fn new(transport: Arc<dyn InvoiceTransport>, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    /// Resolve once the invoice settles, with one status query per
    /// interval and no overlapping in-flight queries.
    ///
    /// A `cancelled` observation and a query failure are both terminal;
    /// neither is retried here.
    pub async fn poll_until_settled(&self, invoice_id: &str) -> Result<(), PaymentError> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() yields its first tick immediately; the first query
        // belongs one full interval after the poller starts
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let status = self
                .transport
                .invoice_status(invoice_id)
                .await
                .map_err(PaymentError::Transport)?;
            if status.is_settled() {
                tracing::info!(
                    invoice_id,
                    sats_received = status.sats_received,
                    "held invoice settled"
                );
                return Ok(());
            }
            if status.cancelled {
                tracing::warn!(invoice_id, "invoice canceled while awaiting settlement");
                return Err(PaymentError::canceled());
            }
            tracing::trace!(invoice_id, "invoice not settled yet");
        }
    }
}
