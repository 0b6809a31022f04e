use serde::{Deserialize, Serialize};

use mercaderp_core::{AggregateId, DomainError, DomainResult};

use crate::FelErrorCode;

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Status of a fiscal document with the tax authority.
///
/// `Authorized` and `Rejected` are the authority's decisions. `Error` and
/// `Timeout` end a submission locally but may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FelStatus {
    Pending,
    Processing,
    Authorized,
    Rejected,
    Error,
    Timeout,
}

impl FelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FelStatus::Pending => "pending",
            FelStatus::Processing => "processing",
            FelStatus::Authorized => "authorized",
            FelStatus::Rejected => "rejected",
            FelStatus::Error => "error",
            FelStatus::Timeout => "timeout",
        }
    }

    /// Still waiting on the authority.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, FelStatus::Pending | FelStatus::Processing)
    }

    /// Decided by the authority; nothing more will happen remotely.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FelStatus::Authorized | FelStatus::Rejected)
    }

    /// A failed outcome that a resubmission may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FelStatus::Error | FelStatus::Rejected | FelStatus::Timeout)
    }
}

impl core::fmt::Display for FelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FEL sub-record embedded in an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FelRecord {
    pub status: FelStatus,
    /// Authorization UUID; present iff `status == Authorized`.
    pub uuid: Option<String>,
    pub error_code: Option<FelErrorCode>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl FelRecord {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            status: FelStatus::Pending,
            uuid: None,
            error_code: None,
            error_message: None,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

/// An invoice as seen by the FEL workflow.
///
/// `requires_fel == false` means the document is a plain receipt and never
/// goes to the tax authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalInvoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub requires_fel: bool,
    pub fel: FelRecord,
}

impl FiscalInvoice {
    /// A fiscal invoice that has not been submitted yet.
    pub fn fiscal(id: InvoiceId, invoice_number: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            id,
            invoice_number: invoice_number.into(),
            requires_fel: true,
            fel: FelRecord::new(max_attempts),
        }
    }

    /// A plain receipt (no FEL attempts allowed).
    pub fn receipt(id: InvoiceId, invoice_number: impl Into<String>) -> Self {
        Self {
            id,
            invoice_number: invoice_number.into(),
            requires_fel: false,
            fel: FelRecord::new(0),
        }
    }

    pub fn status(&self) -> FelStatus {
        self.fel.status
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.fel.attempts_remaining()
    }

    /// Check the record invariants.
    pub fn validate(&self) -> DomainResult<()> {
        if self.fel.attempts > self.fel.max_attempts {
            return Err(DomainError::invariant(format!(
                "invoice {}: fel attempts {} exceed max {}",
                self.invoice_number, self.fel.attempts, self.fel.max_attempts
            )));
        }
        let has_uuid = self.fel.uuid.as_deref().is_some_and(|u| !u.trim().is_empty());
        if has_uuid != (self.fel.status == FelStatus::Authorized) {
            return Err(DomainError::invariant(format!(
                "invoice {}: fel uuid must be set exactly when authorized (status {})",
                self.invoice_number, self.fel.status
            )));
        }
        Ok(())
    }

    /// Whether a resubmission is allowed right now, and why not otherwise.
    pub fn check_retry(&self) -> DomainResult<()> {
        if !self.requires_fel {
            return Err(DomainError::validation("receipts are never sent to the tax authority"));
        }
        if !self.fel.status.is_retryable() {
            return Err(DomainError::conflict(format!(
                "cannot retry a document in status {}",
                self.fel.status
            )));
        }
        if self.fel.error_code == Some(FelErrorCode::DuplicateDocument) {
            return Err(DomainError::conflict(
                "duplicate documents cannot be resubmitted; contact support",
            ));
        }
        if self.attempts_remaining() == 0 {
            return Err(DomainError::conflict(format!(
                "all {} attempts used",
                self.fel.max_attempts
            )));
        }
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.check_retry().is_ok()
    }

    /// Count one submission to the authority and reset the outcome fields.
    pub fn record_attempt(&mut self) -> DomainResult<()> {
        if self.fel.attempts >= self.fel.max_attempts {
            return Err(DomainError::invariant(format!(
                "invoice {}: attempt ceiling {} reached",
                self.invoice_number, self.fel.max_attempts
            )));
        }
        self.fel.attempts += 1;
        self.fel.status = FelStatus::Pending;
        self.fel.uuid = None;
        self.fel.error_code = None;
        self.fel.error_message = None;
        Ok(())
    }

    pub fn mark_processing(&mut self) {
        self.fel.status = FelStatus::Processing;
    }

    pub fn mark_authorized(&mut self, uuid: impl Into<String>) -> DomainResult<()> {
        let uuid = uuid.into();
        if uuid.trim().is_empty() {
            return Err(DomainError::validation("authorization uuid cannot be empty"));
        }
        self.fel.status = FelStatus::Authorized;
        self.fel.uuid = Some(uuid);
        self.fel.error_code = None;
        self.fel.error_message = None;
        Ok(())
    }

    /// Record a failed outcome (`Rejected`, `Error` or `Timeout`).
    pub fn mark_failed(
        &mut self,
        status: FelStatus,
        code: FelErrorCode,
        message: impl Into<String>,
    ) -> DomainResult<()> {
        if !status.is_retryable() {
            return Err(DomainError::validation(format!(
                "{status} is not a failure status"
            )));
        }
        self.fel.status = status;
        self.fel.uuid = None;
        self.fel.error_code = Some(code);
        self.fel.error_message = Some(message.into());
        Ok(())
    }
}
