//! Error-code → recovery-action classification.
//!
//! A pure table over [`FelErrorCode`]: the remote code and the number of
//! attempts left are the only inputs, so classification never needs another
//! round trip and never mutates anything.

use serde::{Deserialize, Serialize};

use crate::{FelErrorCode, FelStatus, FiscalInvoice};

/// Sort order of recommended actions: `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    EditClient,
    Retry,
    Receipt,
    ContactSupport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendedAction {
    pub kind: RecoveryKind,
    pub label: &'static str,
    pub description: &'static str,
    pub priority: ActionPriority,
}

struct Rule {
    kind: RecoveryKind,
    priority: ActionPriority,
}

const fn rule(kind: RecoveryKind, priority: ActionPriority) -> Rule {
    Rule { kind, priority }
}

use ActionPriority::{High, Low, Medium};
use RecoveryKind::{ContactSupport, EditClient, Receipt, Retry};

static CLIENT_DATA_RULES: [Rule; 3] = [
    rule(EditClient, High),
    rule(Retry, Medium),
    rule(Receipt, Low),
];

static TRANSIENT_RULES: [Rule; 2] = [rule(Retry, High), rule(Receipt, Medium)];

static DUPLICATE_RULES: [Rule; 1] = [rule(ContactSupport, High)];

static FALLBACK_RULES: [Rule; 2] = [rule(Retry, Medium), rule(Receipt, Medium)];

fn rules_for(code: &FelErrorCode) -> &'static [Rule] {
    match code {
        FelErrorCode::InvalidNit | FelErrorCode::ClientIncomplete => &CLIENT_DATA_RULES,
        FelErrorCode::ConnectionTimeout | FelErrorCode::ServerError => &TRANSIENT_RULES,
        FelErrorCode::DuplicateDocument => &DUPLICATE_RULES,
        FelErrorCode::Other(_) => &FALLBACK_RULES,
    }
}

fn describe(kind: RecoveryKind) -> (&'static str, &'static str) {
    match kind {
        RecoveryKind::EditClient => (
            "Edit client",
            "Fix the client's NIT or fiscal data, then retry the electronic invoice",
        ),
        RecoveryKind::Retry => (
            "Retry",
            "Send the electronic invoice to the tax authority again",
        ),
        RecoveryKind::Receipt => (
            "Issue receipt",
            "Issue a non-fiscal receipt for this order instead",
        ),
        RecoveryKind::ContactSupport => (
            "Contact support",
            "The authority already holds this document; support must reconcile it",
        ),
    }
}

/// Recommended actions for `code`, sorted by priority (stable).
///
/// `Retry` is dropped once no attempts remain; the receipt fallback never is.
pub fn recommended_actions(code: &FelErrorCode, attempts_remaining: u32) -> Vec<RecommendedAction> {
    let mut actions: Vec<RecommendedAction> = rules_for(code)
        .iter()
        .filter(|rule| rule.kind != RecoveryKind::Retry || attempts_remaining > 0)
        .map(|rule| {
            let (label, description) = describe(rule.kind);
            RecommendedAction {
                kind: rule.kind,
                label,
                description,
                priority: rule.priority,
            }
        })
        .collect();
    actions.sort_by_key(|action| action.priority);
    actions
}

/// Everything the operator sees for a failed fiscal document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub friendly_message: String,
    pub error_code: String,
    pub error_message: Option<String>,
    pub attempts_remaining: u32,
    pub actions: Vec<RecommendedAction>,
}

impl ErrorReport {
    /// Build the report for an invoice in a failed status; `None` otherwise.
    pub fn for_invoice(invoice: &FiscalInvoice) -> Option<Self> {
        if !invoice.requires_fel || !invoice.fel.status.is_retryable() {
            return None;
        }

        let code = effective_code(invoice);
        let attempts_remaining = invoice.attempts_remaining();
        Some(Self {
            friendly_message: code.friendly_message().to_string(),
            error_code: code.as_str().to_string(),
            error_message: invoice.fel.error_message.clone(),
            attempts_remaining,
            actions: recommended_actions(&code, attempts_remaining),
        })
    }
}

/// The code to classify by. A local timeout without a remote code is treated
/// as a connection timeout.
fn effective_code(invoice: &FiscalInvoice) -> FelErrorCode {
    match (&invoice.fel.error_code, invoice.fel.status) {
        (Some(code), _) => code.clone(),
        (None, FelStatus::Timeout) => FelErrorCode::ConnectionTimeout,
        (None, _) => FelErrorCode::Other("unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvoiceId;
    use mercaderp_core::AggregateId;
    use proptest::prelude::*;

    fn summary(actions: &[RecommendedAction]) -> Vec<(RecoveryKind, ActionPriority)> {
        actions.iter().map(|a| (a.kind, a.priority)).collect()
    }

    fn failed(code: FelErrorCode, attempts: u32, max_attempts: u32) -> FiscalInvoice {
        let mut invoice =
            FiscalInvoice::fiscal(InvoiceId::new(AggregateId::new()), "FAC-100", max_attempts);
        invoice.fel.attempts = attempts;
        invoice.mark_failed(FelStatus::Error, code, "remote said no").unwrap();
        invoice
    }

    #[test]
    fn invalid_nit_with_attempts_left() {
        let invoice = failed(FelErrorCode::InvalidNit, 1, 3);
        let report = ErrorReport::for_invoice(&invoice).unwrap();
        assert_eq!(
            summary(&report.actions),
            vec![(EditClient, High), (Retry, Medium), (Receipt, Low)]
        );
        assert_eq!(report.attempts_remaining, 2);
        assert_eq!(report.error_code, "invalid_nit");
        assert_eq!(report.error_message.as_deref(), Some("remote said no"));
    }

    #[test]
    fn duplicate_document_never_offers_retry() {
        let invoice = failed(FelErrorCode::DuplicateDocument, 0, 3);
        let report = ErrorReport::for_invoice(&invoice).unwrap();
        assert_eq!(summary(&report.actions), vec![(ContactSupport, High)]);
    }

    #[test]
    fn exhausted_server_error_falls_back_to_receipt() {
        let invoice = failed(FelErrorCode::ServerError, 3, 3);
        let report = ErrorReport::for_invoice(&invoice).unwrap();
        assert_eq!(summary(&report.actions), vec![(Receipt, Medium)]);
        assert_eq!(report.attempts_remaining, 0);
    }

    #[test]
    fn unknown_code_degrades_to_retry_and_receipt() {
        let actions = recommended_actions(&FelErrorCode::from("E-999"), 1);
        assert_eq!(summary(&actions), vec![(Retry, Medium), (Receipt, Medium)]);
    }

    #[test]
    fn transient_failure_puts_retry_first() {
        let actions = recommended_actions(&FelErrorCode::ConnectionTimeout, 2);
        assert_eq!(summary(&actions), vec![(Retry, High), (Receipt, Medium)]);
    }

    #[test]
    fn local_timeout_without_code_is_classified_as_connection_timeout() {
        let mut invoice =
            FiscalInvoice::fiscal(InvoiceId::new(AggregateId::new()), "FAC-101", 3);
        invoice.fel.status = FelStatus::Timeout;
        let report = ErrorReport::for_invoice(&invoice).unwrap();
        assert_eq!(report.error_code, "connection_timeout");
        assert_eq!(report.actions[0].kind, Retry);
    }

    #[test]
    fn no_report_for_successful_or_in_flight_documents() {
        let mut invoice =
            FiscalInvoice::fiscal(InvoiceId::new(AggregateId::new()), "FAC-102", 3);
        assert!(ErrorReport::for_invoice(&invoice).is_none());
        invoice.mark_authorized("UUID-1").unwrap();
        assert!(ErrorReport::for_invoice(&invoice).is_none());
    }

    fn any_code() -> impl Strategy<Value = FelErrorCode> {
        prop_oneof![
            Just(FelErrorCode::InvalidNit),
            Just(FelErrorCode::ClientIncomplete),
            Just(FelErrorCode::ConnectionTimeout),
            Just(FelErrorCode::ServerError),
            Just(FelErrorCode::DuplicateDocument),
            "[A-Z]{1,3}-[0-9]{1,4}".prop_map(FelErrorCode::Other),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: actions are always sorted high → medium → low.
        #[test]
        fn actions_are_priority_sorted(code in any_code(), remaining in 0u32..5) {
            let actions = recommended_actions(&code, remaining);
            prop_assert!(actions.windows(2).all(|w| w[0].priority <= w[1].priority));
        }

        /// Property: retry is absent when attempts are exhausted or the
        /// document is a duplicate.
        #[test]
        fn retry_only_with_attempts_and_never_for_duplicates(
            code in any_code(),
            remaining in 0u32..5,
        ) {
            let offers_retry = recommended_actions(&code, remaining)
                .iter()
                .any(|a| a.kind == RecoveryKind::Retry);
            let expected = remaining > 0 && code != FelErrorCode::DuplicateDocument;
            prop_assert_eq!(offers_retry, expected);
        }

        /// Property: classification is pure.
        #[test]
        fn classification_is_deterministic(code in any_code(), remaining in 0u32..5) {
            prop_assert_eq!(
                recommended_actions(&code, remaining),
                recommended_actions(&code, remaining)
            );
        }
    }
}
