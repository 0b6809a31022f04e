use std::time::Duration;

use serde::Serialize;

use mercaderp_invoicing::{ErrorReport, FelStatus, FiscalInvoice, InvoiceId};

const SUBMITTED: u8 = 10;
const ACKNOWLEDGED: u8 = 40;
const CEILING: u8 = 95;
const DECIDED: u8 = 100;

/// Ephemeral progress of one FEL submission, as shown to the operator.
///
/// Never persisted; the invoice record is the durable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingSession {
    pub invoice_id: InvoiceId,
    pub status: FelStatus,
    /// 0..=100, non-decreasing while the session runs.
    pub progress: u8,
    pub time_elapsed_secs: u64,
    /// `None` once the expected turnaround has passed.
    pub estimated_time_left_secs: Option<u64>,
    pub error: Option<String>,
    pub cancelled: bool,
    pub attempt: u32,
    /// Last invoice view returned by the authority.
    pub invoice: Option<FiscalInvoice>,
}

impl ProcessingSession {
    pub fn new(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            status: FelStatus::Pending,
            progress: 0,
            time_elapsed_secs: 0,
            estimated_time_left_secs: None,
            error: None,
            cancelled: false,
            attempt: 0,
            invoice: None,
        }
    }

    /// Still waiting on the authority and not cancelled.
    pub fn is_running(&self) -> bool {
        !self.cancelled && self.status.is_in_flight()
    }

    /// Remaining-time label: whole seconds, or `--` when unknown or overdue.
    pub fn eta_display(&self) -> String {
        match self.estimated_time_left_secs {
            Some(secs) if secs > 0 => format!("{secs}s"),
            _ => "--".to_string(),
        }
    }

    pub fn error_report(&self) -> Option<ErrorReport> {
        self.invoice.as_ref().and_then(ErrorReport::for_invoice)
    }

    pub(crate) fn submitted(&mut self, invoice: FiscalInvoice, expected: Duration) {
        self.attempt = invoice.fel.attempts;
        self.status = invoice.status();
        self.error = None;
        self.time_elapsed_secs = 0;
        self.estimated_time_left_secs = Some(expected.as_secs());
        self.progress = SUBMITTED;
        self.invoice = Some(invoice);
        if self.status == FelStatus::Processing {
            self.progress = ACKNOWLEDGED;
        }
    }

    pub(crate) fn tick(&mut self, elapsed: Duration, expected: Duration) {
        self.time_elapsed_secs = elapsed.as_secs();
        let left = expected.saturating_sub(elapsed).as_secs();
        self.estimated_time_left_secs = (left > 0).then_some(left);

        let base = if self.status == FelStatus::Processing { ACKNOWLEDGED } else { SUBMITTED };
        let span = u128::from(CEILING - base);
        let expected_ms = expected.as_millis().max(1);
        let gained = (span * elapsed.as_millis() / expected_ms).min(span) as u8;
        self.progress = self.progress.max(base + gained);
    }

    /// A non-final poll answer.
    pub(crate) fn observe(&mut self, invoice: FiscalInvoice) {
        self.status = invoice.status();
        if self.status == FelStatus::Processing {
            self.progress = self.progress.max(ACKNOWLEDGED);
        }
        self.invoice = Some(invoice);
    }

    pub(crate) fn finish(&mut self, invoice: FiscalInvoice) {
        self.status = invoice.status();
        self.error = invoice.fel.error_message.clone();
        self.estimated_time_left_secs = None;
        if self.status.is_terminal() {
            self.progress = DECIDED;
        }
        self.invoice = Some(invoice);
    }
}
