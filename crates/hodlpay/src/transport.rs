use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::invoice::{Invoice, InvoiceStatus};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("api error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
}

/// Invoice transport: create, cancel, query.
///
/// `invoice_status` must report live server state on every call; hold
/// settlement must never be read from a cache.
#[async_trait]
pub trait InvoiceTransport: Send + Sync {
    /// Create a hold invoice for `amount_sats`.
    async fn create_invoice(&self, amount_sats: u64) -> Result<Invoice, TransportError>;

    /// Cancel an invoice. `hmac` is the credential issued at creation;
    /// the canceled invoice id is returned.
    async fn cancel_invoice(&self, hash: &str, hmac: &str) -> Result<String, TransportError>;

    async fn invoice_status(&self, id: &str) -> Result<InvoiceStatus, TransportError>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceBody {
    amount_sats: u64,
    hold: bool,
    expiry_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelInvoiceBody<'a> {
    hash: &'a str,
    hmac: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelInvoiceResponse {
    id: String,
}

const DEFAULT_EXPIRY_SECS: u64 = 180;

/// HTTP adapter for the invoice transport.
#[derive(Debug, Clone)]
pub struct HttpInvoiceTransport {
    base_url: String,
    auth_token: Option<String>,
    expiry_secs: u64,
    http: reqwest::Client,
}

impl HttpInvoiceTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            expiry_secs: DEFAULT_EXPIRY_SECS,
            http: reqwest::Client::new(),
        }
    }

    /// Expiry requested for created invoices, in seconds.
    #[must_use]
    pub fn with_expiry_secs(mut self, expiry_secs: u64) -> Self {
        self.expiry_secs = expiry_secs;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = self.auth_token.as_ref() {
            request.header("authorization", format!("Bearer {token}"))
        } else {
            request
        }
    }

    async fn decode<TRes>(response: reqwest::Response) -> Result<TRes, TransportError>
    where
        TRes: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            let status_u16 = status.as_u16();
            let body_bytes = response
                .bytes()
                .await
                .map_err(|error| TransportError::Transport(error.to_string()))?;
            if let Ok(parsed) = serde_json::from_slice::<ErrorEnvelope>(&body_bytes) {
                return Err(TransportError::Api {
                    status: status_u16,
                    code: parsed.error.code,
                    message: parsed.error.message,
                });
            }
            let text = String::from_utf8_lossy(body_bytes.as_ref()).to_string();
            return Err(TransportError::Api {
                status: status_u16,
                code: "transport_error".to_string(),
                message: text,
            });
        }

        response
            .json::<TRes>()
            .await
            .map_err(|error| TransportError::Parse(error.to_string()))
    }

    async fn post_json<TReq, TRes>(&self, path: &str, body: &TReq) -> Result<TRes, TransportError>
    where
        TReq: Serialize + ?Sized,
        TRes: for<'de> Deserialize<'de>,
    {
        let response = self
            .authorize(self.http.post(self.url(path)).json(body))
            .send()
            .await
            .map_err(|error| TransportError::Transport(error.to_string()))?;
        Self::decode(response).await
    }
}

#[async_trait]
impl InvoiceTransport for HttpInvoiceTransport {
    async fn create_invoice(&self, amount_sats: u64) -> Result<Invoice, TransportError> {
        self.post_json(
            "/invoices",
            &CreateInvoiceBody {
                amount_sats,
                hold: true,
                expiry_secs: self.expiry_secs,
            },
        )
        .await
    }

    async fn cancel_invoice(&self, hash: &str, hmac: &str) -> Result<String, TransportError> {
        let response: CancelInvoiceResponse = self
            .post_json("/invoices/cancel", &CancelInvoiceBody { hash, hmac })
            .await?;
        Ok(response.id)
    }

    async fn invoice_status(&self, id: &str) -> Result<InvoiceStatus, TransportError> {
        let response = self
            .authorize(
                self.http
                    .get(self.url(&format!("/invoices/{id}/status")))
                    .header("cache-control", "no-cache"),
            )
            .send()
            .await
            .map_err(|error| TransportError::Transport(error.to_string()))?;
        Self::decode(response).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerState {
    Pending,
    Held { sats_received: u64 },
    Canceled,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    invoice: Invoice,
    state: LedgerState,
}

/// In-process hold-invoice ledger.
///
/// Backs the integration tests and lets embedders run the orchestrator
/// without a payment backend. Enforces the same rules the real transport
/// does: the `hmac` credential gates cancellation, and a held invoice
/// refuses to be canceled.
#[derive(Debug)]
pub struct InMemoryInvoiceTransport {
    expiry_secs: i64,
    entries: Mutex<HashMap<String, LedgerEntry>>,
    cancel_requests: Mutex<Vec<(String, String)>>,
    status_queries: AtomicU64,
}

impl InMemoryInvoiceTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            expiry_secs: 180,
            entries: Mutex::new(HashMap::new()),
            cancel_requests: Mutex::new(Vec::new()),
            status_queries: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_expiry_secs(mut self, expiry_secs: i64) -> Self {
        self.expiry_secs = expiry_secs;
        self
    }

    fn lock_error(label: &str) -> TransportError {
        TransportError::Transport(format!("mutex poisoned: {label}"))
    }

    /// Simulate funds arriving and being held for the invoice.
    pub fn mark_held(&self, id: &str, sats_received: u64) -> Result<(), TransportError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::lock_error("entries"))?;
        let Some(entry) = entries.get_mut(id) else {
            return Err(TransportError::Transport(format!("unknown invoice: {id}")));
        };
        if entry.state == LedgerState::Canceled {
            return Err(TransportError::Transport(format!(
                "invoice already canceled: {id}"
            )));
        }
        entry.state = LedgerState::Held { sats_received };
        Ok(())
    }

    /// Simulate server-side cancellation, e.g. expiry.
    pub fn mark_canceled(&self, id: &str) -> Result<(), TransportError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::lock_error("entries"))?;
        let Some(entry) = entries.get_mut(id) else {
            return Err(TransportError::Transport(format!("unknown invoice: {id}")));
        };
        entry.state = LedgerState::Canceled;
        Ok(())
    }

    /// Invoices created so far, in no particular order.
    #[must_use]
    pub fn created_invoices(&self) -> Vec<Invoice> {
        self.entries.lock().map_or_else(
            |_| Vec::new(),
            |entries| entries.values().map(|entry| entry.invoice.clone()).collect(),
        )
    }

    /// `(hash, hmac)` pairs of every cancel request received, in order.
    #[must_use]
    pub fn cancel_requests(&self) -> Vec<(String, String)> {
        self.cancel_requests
            .lock()
            .map_or_else(|_| Vec::new(), |requests| requests.clone())
    }

    /// Number of status queries served.
    #[must_use]
    pub fn status_query_count(&self) -> u64 {
        self.status_queries.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryInvoiceTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceTransport for InMemoryInvoiceTransport {
    async fn create_invoice(&self, amount_sats: u64) -> Result<Invoice, TransportError> {
        let id = format!("inv_{}", uuid::Uuid::new_v4().simple());
        let hash = hex::encode(Sha256::digest(format!("{id}:hash").as_bytes()));
        let hmac = hex::encode(Sha256::digest(format!("{id}:hmac").as_bytes()));
        let invoice = Invoice {
            // payment-request shaped, not a decodable bolt11
            payment_request: format!("lnbc{amount_sats}n1{}", &hash[..24]),
            id: id.clone(),
            hash,
            hmac,
            expires_at: Utc::now() + Duration::seconds(self.expiry_secs),
        };

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::lock_error("entries"))?;
        entries.insert(
            id,
            LedgerEntry {
                invoice: invoice.clone(),
                state: LedgerState::Pending,
            },
        );
        Ok(invoice)
    }

    async fn cancel_invoice(&self, hash: &str, hmac: &str) -> Result<String, TransportError> {
        {
            let mut requests = self
                .cancel_requests
                .lock()
                .map_err(|_| Self::lock_error("cancel_requests"))?;
            requests.push((hash.to_string(), hmac.to_string()));
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::lock_error("entries"))?;
        let Some(entry) = entries
            .values_mut()
            .find(|entry| entry.invoice.hash == hash)
        else {
            return Err(TransportError::Api {
                status: 404,
                code: "unknown_invoice".to_string(),
                message: format!("no invoice with hash {hash}"),
            });
        };
        if entry.invoice.hmac != hmac {
            return Err(TransportError::Api {
                status: 403,
                code: "invalid_hmac".to_string(),
                message: "hmac does not authorize cancellation".to_string(),
            });
        }
        match entry.state {
            LedgerState::Held { .. } => Err(TransportError::Api {
                status: 409,
                code: "invoice_held".to_string(),
                message: "held invoices cannot be canceled".to_string(),
            }),
            LedgerState::Pending | LedgerState::Canceled => {
                entry.state = LedgerState::Canceled;
                Ok(entry.invoice.id.clone())
            }
        }
    }

    async fn invoice_status(&self, id: &str) -> Result<InvoiceStatus, TransportError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .entries
            .lock()
            .map_err(|_| Self::lock_error("entries"))?;
        let Some(entry) = entries.get(id) else {
            return Err(TransportError::Api {
                status: 404,
                code: "unknown_invoice".to_string(),
                message: format!("no invoice with id {id}"),
            });
        };
        Ok(match entry.state {
            LedgerState::Pending => InvoiceStatus::default(),
            LedgerState::Held { sats_received } => InvoiceStatus {
                is_held: true,
                sats_received,
                cancelled: false,
            },
            LedgerState::Canceled => InvoiceStatus {
                is_held: false,
                sats_received: 0,
                cancelled: true,
            },
        })
    }
}
