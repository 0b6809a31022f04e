use thiserror::Error;

use mercaderp_core::DomainError;
use mercaderp_invoicing::InvoiceId;

use crate::transport::TransportError;

/// Coordinator-level failure.
#[derive(Debug, Error)]
pub enum FelError {
    #[error("invoice {0} already has an active FEL session")]
    AlreadyProcessing(InvoiceId),

    #[error("invoice {0} is still processing")]
    StillProcessing(InvoiceId),

    #[error("invoice {0} was cancelled locally and the authority has not settled it yet")]
    AwaitingReconciliation(InvoiceId),

    #[error("invoice {0} is already authorized")]
    AlreadyAuthorized(InvoiceId),

    #[error("invoice {0} is not authorized")]
    NotAuthorized(InvoiceId),

    #[error("no FEL session for invoice {0}")]
    NoSession(InvoiceId),

    #[error("FEL session for invoice {0} has already finished")]
    Finished(InvoiceId),

    #[error("retry not allowed: {0}")]
    RetryNotAllowed(String),

    #[error("not eligible for an electronic invoice: {0}")]
    NotEligible(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
