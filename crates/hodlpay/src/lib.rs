//! Hold-invoice payment resolution.
//!
//! Issues a time-bounded hold invoice for a priced action and races two
//! settlement channels (an automated wallet provider and a manual
//! presentation to a human), settling on whichever confirms first, with
//! at most one winner and guaranteed cleanup of the losing arm.
//!
//! Cancellation contract:
//! - Stopping background work (a poller, a pending wallet send) never
//!   cancels the invoice; only an explicit cancel call or a
//!   server-reported `cancelled` status does.
//! - A canceled invoice can never be paid; [`PaymentError::Canceled`] is
//!   terminal and never triggers a fallback channel.

pub mod error;
pub mod invoice;
pub mod manual;
pub mod orchestrator;
pub mod poller;
pub mod presenter;
pub mod provider;
pub mod transport;
pub mod wallet;

pub use error::PaymentError;
pub use invoice::{FeeContext, Invoice, InvoiceStatus, PaymentResolution};
pub use manual::ManualChannel;
pub use orchestrator::{PaymentConfig, PaymentOrchestrator};
pub use poller::InvoiceStatusPoller;
pub use presenter::{
    InMemoryPresenter, InvoicePresenter, Presentation, PresentationDriver, PresentationEvent,
};
pub use provider::{DisabledProvider, ProviderError, WalletProvider};
pub use transport::{
    HttpInvoiceTransport, InMemoryInvoiceTransport, InvoiceTransport, TransportError,
};
pub use wallet::{WalletAttempt, WalletChannel};
