use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use mercaderp_invoicing::{FelErrorCode, FelStatus, FiscalInvoice, InvoiceId};

/// A request to issue an electronic invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FelRequest {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub client_tax_id: String,
    /// Total in minor currency units.
    pub total: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("authority refused the request ({code}): {message}")]
    Remote { code: FelErrorCode, message: String },

    #[error("authority has no document for invoice {0}")]
    NotFound(InvoiceId),
}

/// Boundary to the fiscal authority.
///
/// Every call returns the authority's current view of the invoice.
#[async_trait]
pub trait FelTransport: Send + Sync + 'static {
    async fn submit(&self, request: &FelRequest) -> Result<FiscalInvoice, TransportError>;

    /// Resubmit a failed document; counts one more attempt.
    async fn resubmit(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError>;

    async fn poll_status(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError>;

    /// Rendered document of an authorized invoice.
    async fn download_document(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, TransportError>;
}

/// What the in-memory authority answers to the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Acknowledge the document and keep working on it.
    Processing,
    Authorize,
    Fail {
        status: FelStatus,
        code: FelErrorCode,
        message: String,
    },
    /// The poll itself fails; the remote state is untouched.
    PollError(String),
}

impl ScriptedOutcome {
    pub fn fail(status: FelStatus, code: FelErrorCode, message: impl Into<String>) -> Self {
        Self::Fail { status, code, message: message.into() }
    }
}

#[derive(Debug)]
struct RemoteDocument {
    invoice: FiscalInvoice,
    submissions: u32,
}

/// In-memory fiscal authority for tests and the console demo.
///
/// Polls consume the outcomes scripted for an invoice in order; once the
/// script runs out the document stays in whatever state it reached.
#[derive(Debug, Default)]
pub struct InMemoryFelTransport {
    documents: RwLock<HashMap<InvoiceId, RemoteDocument>>,
    scripts: RwLock<HashMap<InvoiceId, VecDeque<ScriptedOutcome>>>,
    submit_failures: RwLock<VecDeque<TransportError>>,
}

impl InMemoryFelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append outcomes for upcoming polls of `invoice_id`.
    pub fn script(&self, invoice_id: InvoiceId, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(invoice_id)
            .or_default()
            .extend(outcomes);
    }

    /// Make the next `submit` or `resubmit` fail with `error`.
    pub fn fail_next_submit(&self, error: TransportError) {
        self.submit_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of times the authority received the document.
    pub fn submissions(&self, invoice_id: InvoiceId) -> u32 {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&invoice_id)
            .map_or(0, |doc| doc.submissions)
    }

    fn take_submit_failure(&self) -> Option<TransportError> {
        self.submit_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn next_outcome(&self, invoice_id: InvoiceId) -> Option<ScriptedOutcome> {
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&invoice_id)
            .and_then(VecDeque::pop_front)
    }
}

fn remote(error: mercaderp_core::DomainError) -> TransportError {
    TransportError::Remote {
        code: FelErrorCode::Other("rejected_request".to_string()),
        message: error.to_string(),
    }
}

#[async_trait]
impl FelTransport for InMemoryFelTransport {
    async fn submit(&self, request: &FelRequest) -> Result<FiscalInvoice, TransportError> {
        if let Some(error) = self.take_submit_failure() {
            return Err(error);
        }
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = documents.get(&request.invoice_id) {
            return Err(TransportError::Remote {
                code: FelErrorCode::DuplicateDocument,
                message: format!(
                    "invoice {} was already received (status {})",
                    existing.invoice.invoice_number,
                    existing.invoice.status()
                ),
            });
        }
        let mut invoice = FiscalInvoice::fiscal(
            request.invoice_id,
            request.invoice_number.clone(),
            request.max_attempts,
        );
        invoice.record_attempt().map_err(remote)?;
        documents.insert(request.invoice_id, RemoteDocument { invoice: invoice.clone(), submissions: 1 });
        Ok(invoice)
    }

    async fn resubmit(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError> {
        if let Some(error) = self.take_submit_failure() {
            return Err(error);
        }
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let doc = documents.get_mut(&invoice_id).ok_or(TransportError::NotFound(invoice_id))?;
        doc.invoice.check_retry().map_err(remote)?;
        doc.invoice.record_attempt().map_err(remote)?;
        doc.submissions += 1;
        Ok(doc.invoice.clone())
    }

    async fn poll_status(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError> {
        let outcome = self.next_outcome(invoice_id);
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let doc = documents.get_mut(&invoice_id).ok_or(TransportError::NotFound(invoice_id))?;
        match outcome {
            None => {}
            Some(ScriptedOutcome::Processing) => doc.invoice.mark_processing(),
            Some(ScriptedOutcome::Authorize) => {
                doc.invoice.mark_authorized(Uuid::now_v7().to_string()).map_err(remote)?;
            }
            Some(ScriptedOutcome::Fail { status, code, message }) => {
                doc.invoice.mark_failed(status, code, message).map_err(remote)?;
            }
            Some(ScriptedOutcome::PollError(message)) => return Err(TransportError::Network(message)),
        }
        Ok(doc.invoice.clone())
    }

    async fn download_document(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, TransportError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let doc = documents.get(&invoice_id).ok_or(TransportError::NotFound(invoice_id))?;
        match (&doc.invoice.fel.status, &doc.invoice.fel.uuid) {
            (FelStatus::Authorized, Some(uuid)) => Ok(format!(
                "FEL DTE {}\nAUTHORIZATION {}\n",
                doc.invoice.invoice_number, uuid
            )
            .into_bytes()),
            _ => Err(TransportError::NotFound(invoice_id)),
        }
    }
}
