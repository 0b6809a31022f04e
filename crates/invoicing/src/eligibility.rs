//! Which documents an order may produce.
//!
//! A receipt needs nothing beyond a delivered or paid order. A fiscal invoice
//! additionally needs a client with a usable NIT and complete fiscal data.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mercaderp_core::{AggregateId, DomainError};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order lifecycle as reported by the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Delivered,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Delivered,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn produces_documents(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Paid)
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// The slice of an order the advisor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub order_number: String,
    pub client_id: ClientId,
    pub status: OrderStatus,
    /// Smallest currency unit.
    pub total: u64,
    /// An invoice or receipt was already issued for this order.
    pub documented: bool,
}

/// The slice of a client the advisor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub name: String,
    pub tax_id: Option<String>,
    pub fiscal_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Invoice,
    Receipt,
}

/// Answer to "may this order get an electronic invoice?".
///
/// `reason` is shown to the operator verbatim when `can_create` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FelEligibility {
    pub can_create: bool,
    pub reason: Option<String>,
}

impl FelEligibility {
    fn allowed() -> Self {
        Self {
            can_create: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_create: false,
            reason: Some(reason.into()),
        }
    }
}

/// What the document selector should offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentChoice {
    /// No document can be issued yet.
    Unavailable { reason: String },
    /// Only a receipt; no choice is offered.
    ReceiptOnly { fel_reason: String },
    /// The operator must pick one before issuing.
    ChooseOne { options: Vec<DocumentType> },
}

impl DocumentChoice {
    pub fn eligible(&self) -> Vec<DocumentType> {
        match self {
            DocumentChoice::Unavailable { .. } => Vec::new(),
            DocumentChoice::ReceiptOnly { .. } => vec![DocumentType::Receipt],
            DocumentChoice::ChooseOne { options } => options.clone(),
        }
    }
}

const WALK_IN_PLACEHOLDERS: [&str; 4] = ["CF", "C/F", "C.F.", "CONSUMIDOR FINAL"];

const MIN_TAX_ID_LEN: usize = 8;

/// Syntactic NIT check: at least 8 characters and not a walk-in placeholder.
pub fn is_valid_tax_id(tax_id: &str) -> bool {
    let normalized = tax_id.trim().to_ascii_uppercase();
    normalized.chars().count() >= MIN_TAX_ID_LEN
        && !WALK_IN_PLACEHOLDERS.contains(&normalized.as_str())
}

/// Order-side rules shared by receipts and invoices.
fn order_blocker(order: &OrderSnapshot) -> Option<String> {
    if !order.status.produces_documents() {
        return Some(format!(
            "Order {} must be delivered or paid before a document is issued",
            order.order_number
        ));
    }
    if order.documented {
        return Some(format!("Order {} already has a document", order.order_number));
    }
    None
}

pub fn can_create_fel(order: &OrderSnapshot, client: &ClientSnapshot) -> FelEligibility {
    if let Some(reason) = order_blocker(order) {
        return FelEligibility::denied(reason);
    }
    if order.client_id != client.id {
        return FelEligibility::denied(format!(
            "Client {} does not belong to order {}",
            client.name, order.order_number
        ));
    }
    if order.total == 0 {
        return FelEligibility::denied("An electronic invoice needs a total greater than zero");
    }
    match client.tax_id.as_deref() {
        Some(nit) if is_valid_tax_id(nit) => {}
        _ => {
            return FelEligibility::denied(format!(
                "Client {} has no valid NIT (at least {MIN_TAX_ID_LEN} characters, not CF); issue a receipt instead",
                client.name
            ));
        }
    }

    let mut missing = Vec::new();
    if client.name.trim().is_empty() {
        missing.push("name");
    }
    if client
        .fiscal_address
        .as_deref()
        .is_none_or(|address| address.trim().is_empty())
    {
        missing.push("fiscal address");
    }
    if !missing.is_empty() {
        return FelEligibility::denied(format!(
            "Client data is incomplete: missing {}",
            missing.join(", ")
        ));
    }

    FelEligibility::allowed()
}

/// Decide what the document selector offers for `order`.
pub fn document_choice(order: &OrderSnapshot, client: &ClientSnapshot) -> DocumentChoice {
    if let Some(reason) = order_blocker(order) {
        return DocumentChoice::Unavailable { reason };
    }

    let fel = can_create_fel(order, client);
    if fel.can_create {
        DocumentChoice::ChooseOne {
            options: vec![DocumentType::Invoice, DocumentType::Receipt],
        }
    } else {
        DocumentChoice::ReceiptOnly {
            fel_reason: fel.reason.unwrap_or_default(),
        }
    }
}
