use std::sync::{Arc, OnceLock};

use crate::error::PaymentError;
use crate::invoice::Invoice;
use crate::presenter::{InvoicePresenter, Presentation, PresentationEvent};
use crate::transport::InvoiceTransport;

/// Manual settlement channel: show the payable request to a human and
/// wait for settlement or abandonment.
pub struct ManualChannel {
    transport: Arc<dyn InvoiceTransport>,
    presenter: Arc<dyn InvoicePresenter>,
}

impl ManualChannel {
    #[must_use]
    pub fn new(transport: Arc<dyn InvoiceTransport>, presenter: Arc<dyn InvoicePresenter>) -> Self {
        Self {
            transport,
            presenter,
        }
    }

    /// Present the invoice and wait for a settlement signal or a
    /// user-initiated abandonment.
    ///
    /// Abandonment cancels the invoice with its `hash`/`hmac` credential.
    /// Settlement is sticky: once recorded it wins any race with the
    /// cancellation intent, and no cancellation request is issued after
    /// it.
    pub async fn present_and_wait(&self, invoice: &Invoice) -> Result<(), PaymentError> {
        let mut presentation = self.presenter.present(invoice).await;
        tracing::debug!(invoice_id = %invoice.id, "presented invoice for manual settlement");

        // Write-once settlement marker shared by the settlement and
        // abandonment continuations.
        let settled: OnceLock<()> = OnceLock::new();

        match presentation.next_event().await {
            Some(PresentationEvent::Settled) => {
                let _ = settled.set(());
                presentation.close();
                tracing::info!(invoice_id = %invoice.id, "manual settlement observed");
                Ok(())
            }
            Some(PresentationEvent::Abandoned) | None => {
                self.cancel_abandoned(invoice, &settled, &mut presentation)
                    .await
            }
        }
    }

    /// Cancel an abandoned invoice. A settlement signal that lands while
    /// the cancel request is in flight still wins: the invoice stays
    /// paid and the cancel call's own outcome is ignored.
    async fn cancel_abandoned(
        &self,
        invoice: &Invoice,
        settled: &OnceLock<()>,
        presentation: &mut Presentation,
    ) -> Result<(), PaymentError> {
        tracing::info!(invoice_id = %invoice.id, "presentation abandoned, canceling invoice");
        let cancel = self.transport.cancel_invoice(&invoice.hash, &invoice.hmac);
        tokio::pin!(cancel);
        let mut signals_open = true;

        loop {
            tokio::select! {
                biased;
                event = presentation.next_event(), if signals_open => match event {
                    Some(PresentationEvent::Settled) => {
                        let _ = settled.set(());
                        presentation.close();
                        tracing::info!(
                            invoice_id = %invoice.id,
                            "settlement arrived during cancellation, invoice stays paid"
                        );
                        return Ok(());
                    }
                    Some(PresentationEvent::Abandoned) => {}
                    None => signals_open = false,
                },
                canceled = &mut cancel => {
                    if settled.get().is_some() {
                        return Ok(());
                    }
                    return match canceled {
                        Ok(id) => {
                            tracing::warn!(invoice_id = %id, "invoice canceled after abandonment");
                            Err(PaymentError::canceled())
                        }
                        Err(error) => Err(PaymentError::Transport(error)),
                    };
                }
            }
        }
    }
}
