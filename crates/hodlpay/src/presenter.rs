use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::invoice::Invoice;

/// Signals reported by a presentation while an invoice is on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationEvent {
    /// The presenter observed settlement of the displayed invoice.
    Settled,
    /// The human dismissed the presentation without paying.
    Abandoned,
}

/// Orchestration-side handle to a live presentation.
#[derive(Debug)]
pub struct Presentation {
    events: mpsc::UnboundedReceiver<PresentationEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl Presentation {
    /// Create a connected handle/driver pair. The presenter keeps the
    /// driver and reports signals through it; the orchestration side
    /// consumes events and may close the presentation.
    #[must_use]
    pub fn channel() -> (Self, PresentationDriver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                events: event_rx,
                close: Some(close_tx),
            },
            PresentationDriver {
                events: event_tx,
                closed: close_rx,
            },
        )
    }

    /// Next signal, `None` once the presenter dropped its driver.
    pub async fn next_event(&mut self) -> Option<PresentationEvent> {
        self.events.recv().await
    }

    /// Tear the presentation down from the orchestration side.
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Presenter-side counterpart of [`Presentation`].
#[derive(Debug)]
pub struct PresentationDriver {
    events: mpsc::UnboundedSender<PresentationEvent>,
    closed: oneshot::Receiver<()>,
}

impl PresentationDriver {
    /// Report that the displayed invoice settled.
    pub fn settled(&self) {
        let _ = self.events.send(PresentationEvent::Settled);
    }

    /// Report that the human dismissed the presentation unpaid.
    pub fn abandoned(&self) {
        let _ = self.events.send(PresentationEvent::Abandoned);
    }

    /// Whether the orchestration side has closed (or dropped) the
    /// presentation.
    pub fn is_closed(&mut self) -> bool {
        !matches!(
            self.closed.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

/// Presents a payable request to a human and reports what happens.
#[async_trait]
pub trait InvoicePresenter: Send + Sync {
    async fn present(&self, invoice: &Invoice) -> Presentation;
}

#[derive(Debug)]
struct PresentedInvoice {
    invoice: Invoice,
    driver: PresentationDriver,
}

/// Records presentations and lets tests or embedders drive their signals
/// by hand.
#[derive(Debug, Default)]
pub struct InMemoryPresenter {
    sessions: Mutex<Vec<PresentedInvoice>>,
}

impl InMemoryPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoices shown so far, in presentation order.
    #[must_use]
    pub fn presented(&self) -> Vec<Invoice> {
        self.sessions.lock().map_or_else(
            |_| Vec::new(),
            |sessions| {
                sessions
                    .iter()
                    .map(|session| session.invoice.clone())
                    .collect()
            },
        )
    }

    /// Fire a settlement signal on the most recent presentation.
    pub fn settle_current(&self) {
        if let Ok(sessions) = self.sessions.lock() {
            if let Some(session) = sessions.last() {
                session.driver.settled();
            }
        }
    }

    /// Fire an abandonment signal on the most recent presentation.
    pub fn abandon_current(&self) {
        if let Ok(sessions) = self.sessions.lock() {
            if let Some(session) = sessions.last() {
                session.driver.abandoned();
            }
        }
    }

    /// Whether the most recent presentation has been closed.
    #[must_use]
    pub fn current_closed(&self) -> bool {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions
                .last_mut()
                .is_some_and(|session| session.driver.is_closed()),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl InvoicePresenter for InMemoryPresenter {
    async fn present(&self, invoice: &Invoice) -> Presentation {
        let (presentation, driver) = Presentation::channel();
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(PresentedInvoice {
                invoice: invoice.clone(),
                driver,
            });
        }
        presentation
    }
}
