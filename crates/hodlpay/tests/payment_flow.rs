//! End-to-end resolution flows driven through the in-memory
//! collaborators: channel selection, settlement races, cancellation
//! semantics, and the error chain handed back to callers.

use std::error::Error as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hodlpay::{
    FeeContext, InMemoryInvoiceTransport, InMemoryPresenter, Invoice, InvoiceStatus,
    InvoiceTransport, PaymentConfig, PaymentError, PaymentOrchestrator, PaymentResolution,
    ProviderError, TransportError, WalletProvider,
};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

struct ScriptedProvider {
    delay: Duration,
    result: Mutex<Option<Result<(), ProviderError>>>,
}

impl ScriptedProvider {
    fn new(delay: Duration, result: Result<(), ProviderError>) -> Self {
        Self {
            delay,
            result: Mutex::new(Some(result)),
        }
    }

    fn hanging() -> Self {
        Self {
            delay: Duration::ZERO,
            result: Mutex::new(None),
        }
    }
}

#[async_trait]
impl WalletProvider for ScriptedProvider {
    fn enabled(&self) -> bool {
        true
    }

    async fn send_payment(&self, _payment_request: &str) -> Result<(), ProviderError> {
        tokio::time::sleep(self.delay).await;
        let outcome = self.result.lock().ok().and_then(|mut result| result.take());
        match outcome {
            Some(result) => result,
            // hold-invoice sends may never resolve
            None => std::future::pending().await,
        }
    }
}

/// Delegating transport whose cancel call takes a while, so a settlement
/// signal can land while the cancel request is in flight.
struct SlowCancelTransport {
    inner: Arc<InMemoryInvoiceTransport>,
    cancel_delay: Duration,
}

#[async_trait]
impl InvoiceTransport for SlowCancelTransport {
    async fn create_invoice(&self, amount_sats: u64) -> Result<Invoice, TransportError> {
        self.inner.create_invoice(amount_sats).await
    }

    async fn cancel_invoice(&self, hash: &str, hmac: &str) -> Result<String, TransportError> {
        tokio::time::sleep(self.cancel_delay).await;
        self.inner.cancel_invoice(hash, hmac).await
    }

    async fn invoice_status(&self, id: &str) -> Result<InvoiceStatus, TransportError> {
        self.inner.invoice_status(id).await
    }
}

fn orchestrator(
    transport: Arc<dyn InvoiceTransport>,
    provider: impl WalletProvider + 'static,
    presenter: Arc<InMemoryPresenter>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(transport, Arc::new(provider), presenter).with_config(PaymentConfig {
        poll_interval: POLL_INTERVAL,
    })
}

fn spawn_payment(
    orchestrator: PaymentOrchestrator,
    fee: FeeContext,
    user_balance_sats: u64,
) -> JoinHandle<Result<PaymentResolution, PaymentError>> {
    tokio::spawn(async move { orchestrator.payment(fee, user_balance_sats).await })
}

async fn wait_until_presented(presenter: &InMemoryPresenter) {
    while presenter.presented().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn priced(total_sats: u64) -> FeeContext {
    FeeContext {
        total_sats,
        free: false,
    }
}

#[tokio::test]
async fn manual_settlement_returns_the_full_invoice() -> anyhow::Result<()> {
    // provider disabled, balance short of the fee: the manual channel
    // resolves a freshly created invoice
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let orchestrator = orchestrator(
        transport.clone(),
        hodlpay::DisabledProvider,
        presenter.clone(),
    );

    let payment = spawn_payment(orchestrator, priced(1000), 500);
    wait_until_presented(&presenter).await;
    presenter.settle_current();

    let resolution = payment.await??;
    let created = transport.created_invoices();
    assert_eq!(created.len(), 1);
    assert_eq!(resolution, PaymentResolution::Paid(created[0].clone()));

    let invoice = created[0].clone();
    assert!(!invoice.id.is_empty());
    assert!(!invoice.payment_request.is_empty());
    assert_eq!(resolution.hash(), Some(invoice.hash.as_str()));
    assert_eq!(resolution.hmac(), Some(invoice.hmac.as_str()));
    assert!(invoice.expires_at > chrono::Utc::now());

    assert!(presenter.current_closed());
    assert!(transport.cancel_requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn poller_settlement_wins_while_the_provider_flounders() -> anyhow::Result<()> {
    // the provider rejection lands only after the poller has observed
    // settlement, so it is discarded with the losing arm
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let provider = ScriptedProvider::new(
        POLL_INTERVAL * 20,
        Err(ProviderError::PaymentFailed("timed out".to_string())),
    );
    let orchestrator = orchestrator(transport.clone(), provider, presenter.clone());

    let payment = spawn_payment(orchestrator, priced(1000), 0);

    // first poll sees a pending invoice; funds arrive before the second
    tokio::time::sleep(POLL_INTERVAL + Duration::from_millis(10)).await;
    let created = transport.created_invoices();
    assert_eq!(created.len(), 1);
    transport.mark_held(&created[0].id, 1000)?;

    let resolution = payment.await??;
    assert_eq!(resolution, PaymentResolution::Paid(created[0].clone()));
    assert!(presenter.presented().is_empty());

    // the race is over: no further status queries
    let queries_after_settlement = transport.status_query_count();
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(transport.status_query_count(), queries_after_settlement);
    Ok(())
}

#[tokio::test]
async fn cancellation_seen_by_the_poller_skips_the_manual_channel() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let orchestrator = orchestrator(
        transport.clone(),
        ScriptedProvider::hanging(),
        presenter.clone(),
    );

    let payment = spawn_payment(orchestrator, priced(1000), 0);
    while transport.created_invoices().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let created = transport.created_invoices();
    transport.mark_canceled(&created[0].id)?;

    let outcome = payment.await?;
    assert!(matches!(
        outcome,
        Err(PaymentError::Canceled {
            wallet_failure: None
        })
    ));
    assert!(presenter.presented().is_empty());

    let queries_after_cancellation = transport.status_query_count();
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(transport.status_query_count(), queries_after_cancellation);
    Ok(())
}

#[tokio::test]
async fn abandonment_cancels_and_rejects() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let orchestrator = orchestrator(
        transport.clone(),
        hodlpay::DisabledProvider,
        presenter.clone(),
    );

    let payment = spawn_payment(orchestrator, priced(1000), 0);
    wait_until_presented(&presenter).await;
    presenter.abandon_current();

    let outcome = payment.await?;
    assert!(matches!(outcome, Err(PaymentError::Canceled { .. })));

    let created = transport.created_invoices();
    assert_eq!(
        transport.cancel_requests(),
        vec![(created[0].hash.clone(), created[0].hmac.clone())]
    );
    let status = transport.invoice_status(&created[0].id).await?;
    assert!(status.cancelled);
    Ok(())
}

#[tokio::test]
async fn settlement_is_sticky_against_a_queued_abandonment() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let orchestrator = orchestrator(
        transport.clone(),
        hodlpay::DisabledProvider,
        presenter.clone(),
    );

    let payment = spawn_payment(orchestrator, priced(1000), 0);
    wait_until_presented(&presenter).await;
    presenter.settle_current();
    presenter.abandon_current();

    let resolution = payment.await??;
    assert!(matches!(resolution, PaymentResolution::Paid(_)));
    assert!(transport.cancel_requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn settlement_during_an_in_flight_cancel_wins() -> anyhow::Result<()> {
    let inner = Arc::new(InMemoryInvoiceTransport::new());
    let transport = Arc::new(SlowCancelTransport {
        inner: inner.clone(),
        cancel_delay: Duration::from_millis(200),
    });
    let presenter = Arc::new(InMemoryPresenter::new());
    let orchestrator = orchestrator(transport, hodlpay::DisabledProvider, presenter.clone());

    let payment = spawn_payment(orchestrator, priced(1000), 0);
    wait_until_presented(&presenter).await;
    presenter.abandon_current();
    tokio::time::sleep(Duration::from_millis(50)).await;
    presenter.settle_current();

    let resolution = payment.await??;
    assert!(matches!(resolution, PaymentResolution::Paid(_)));
    Ok(())
}

#[tokio::test]
async fn canceled_after_a_wallet_deferral_keeps_the_provider_cause() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let provider = ScriptedProvider::new(
        Duration::ZERO,
        Err(ProviderError::PaymentFailed("no route".to_string())),
    );
    let orchestrator = orchestrator(transport.clone(), provider, presenter.clone());

    let payment = spawn_payment(orchestrator, priced(1000), 0);
    wait_until_presented(&presenter).await;
    presenter.abandon_current();

    let outcome = payment.await?;
    let error = match outcome {
        Err(error) => error,
        Ok(resolution) => anyhow::bail!("expected cancellation, got {resolution:?}"),
    };
    assert!(error.is_canceled());

    let wallet_failure = error
        .source()
        .ok_or_else(|| anyhow::anyhow!("missing wallet failure in the chain"))?;
    assert_eq!(wallet_failure.to_string(), "wallet provider payment failed");
    let provider_failure = wallet_failure
        .source()
        .ok_or_else(|| anyhow::anyhow!("missing provider failure in the chain"))?;
    assert_eq!(provider_failure.to_string(), "payment failed: no route");
    Ok(())
}

#[tokio::test]
async fn provider_cancellation_never_presents_the_invoice() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryInvoiceTransport::new());
    let presenter = Arc::new(InMemoryPresenter::new());
    let provider = ScriptedProvider::new(Duration::ZERO, Err(ProviderError::InvoiceCanceled));
    let orchestrator = orchestrator(transport.clone(), provider, presenter.clone());

    let outcome = spawn_payment(orchestrator, priced(1000), 0).await?;
    assert!(matches!(outcome, Err(PaymentError::Canceled { .. })));
    assert!(presenter.presented().is_empty());
    Ok(())
}
