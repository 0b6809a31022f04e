//! Fiscal documents (FEL) and receipts.
//!
//! Pure domain logic: the invoice record and its invariants, error-code
//! classification into recovery actions, and document eligibility. The
//! asynchronous submission flow lives in `mercaderp-fel`.

pub mod eligibility;
pub mod error_code;
pub mod fel;
pub mod recovery;

pub use eligibility::{
    ClientId, ClientSnapshot, DocumentChoice, DocumentType, FelEligibility, OrderId,
    OrderSnapshot, OrderStatus, can_create_fel, document_choice, is_valid_tax_id,
};
pub use error_code::FelErrorCode;
pub use fel::{FelRecord, FelStatus, FiscalInvoice, InvoiceId};
pub use recovery::{ActionPriority, ErrorReport, RecommendedAction, RecoveryKind, recommended_actions};
