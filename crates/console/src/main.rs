//! Operator console: inspect workflow rules and run FEL submissions against
//! the in-memory authority. Prints JSON to stdout; logs go to stderr.

mod cli;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use serde_json::json;

use mercaderp_core::AggregateId;
use mercaderp_fel::{
    FelConfig, FelCoordinator, FelEligibilityAdvisor, FelRequest, InMemoryDirectory,
    InMemoryFelTransport, ScriptedOutcome,
};
use mercaderp_inventory::{
    EntryStatus, actions_for_status, available_actions_for_user, confirmation_config, explain_actions_for_user,
};
use mercaderp_invoicing::{
    ClientId, ClientSnapshot, ErrorReport, FelErrorCode, FelStatus, FiscalInvoice, InvoiceId, OrderId,
    OrderSnapshot, OrderStatus,
};

use cli::{Cli, Command, Scenario};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    mercaderp_observability::init();

    let command = Cli::parse().validated()?;

    match command {
        Command::Actions { status, role, owner } => {
            let offered = available_actions_for_user(status, &role, owner);
            let decisions = explain_actions_for_user(status, &role, owner);
            print(&json!({ "offered": offered, "decisions": decisions }))?;
        }
        Command::Confirm { action, entry_number, entry_type } => {
            let definition = EntryStatus::ALL
                .into_iter()
                .flat_map(actions_for_status)
                .find(|a| a.id == action)
                .ok_or_else(|| anyhow!("action '{action}' is not offered from any status"))?;
            print(&confirmation_config(definition, &entry_number, entry_type.label()))?;
        }
        Command::Recover { code, attempts, max_attempts } => {
            let mut invoice = FiscalInvoice::fiscal(InvoiceId::new(AggregateId::new()), "FAC-DEMO", max_attempts);
            for _ in 0..attempts {
                invoice.record_attempt()?;
            }
            let status = if code == FelErrorCode::ConnectionTimeout { FelStatus::Timeout } else { FelStatus::Error };
            let message = code.friendly_message();
            invoice.mark_failed(status, code, message)?;
            print(&ErrorReport::for_invoice(&invoice))?;
        }
        Command::Eligibility { tax_id, order_status } => eligibility(tax_id, order_status).await?,
        Command::Simulate { outcome } => simulate(outcome).await?,
    }
    Ok(())
}

fn print<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn eligibility(tax_id: String, order_status: OrderStatus) -> anyhow::Result<()> {
    let directory = Arc::new(InMemoryDirectory::new());
    let client_id = ClientId(AggregateId::new());
    let order_id = OrderId(AggregateId::new());
    directory.insert_client(ClientSnapshot {
        id: client_id,
        name: "Cliente de demostración".to_string(),
        tax_id: Some(tax_id),
        fiscal_address: Some("Ciudad de Guatemala".to_string()),
    });
    directory.insert_order(OrderSnapshot {
        id: order_id,
        order_number: "PED-DEMO".to_string(),
        client_id,
        status: order_status,
        total: 100_00,
        documented: false,
    });

    let advisor = FelEligibilityAdvisor::new(directory);
    let fel = advisor.can_create_fel(order_id).await?;
    let choice = advisor.document_choice(order_id).await?;
    println!("{}", serde_json::to_string_pretty(&json!({ "fel": fel, "choice": choice }))?);
    Ok(())
}

async fn simulate(scenario: Scenario) -> anyhow::Result<()> {
    let config = FelConfig::from_env().context("invalid FEL configuration")?;
    let transport = Arc::new(InMemoryFelTransport::new());
    let coordinator =
        FelCoordinator::new(Arc::clone(&transport), config).context("inconsistent FEL timings")?;

    let request = FelRequest {
        invoice_id: InvoiceId::new(AggregateId::new()),
        invoice_number: "FAC-DEMO-0001".to_string(),
        client_tax_id: "1234567-8".to_string(),
        total: 250_00,
        max_attempts: 3,
    };
    let invoice_id = request.invoice_id;
    let script = match scenario {
        Scenario::Authorize => vec![ScriptedOutcome::Processing, ScriptedOutcome::Authorize],
        Scenario::Reject => vec![
            ScriptedOutcome::Processing,
            ScriptedOutcome::fail(FelStatus::Rejected, FelErrorCode::InvalidNit, "NIT no válido"),
        ],
        Scenario::Timeout => Vec::new(),
        Scenario::Flaky => vec![
            ScriptedOutcome::PollError("connection reset by peer".to_string()),
            ScriptedOutcome::Processing,
            ScriptedOutcome::Authorize,
        ],
    };
    transport.script(invoice_id, script);

    let mut handle = coordinator.create_fel_invoice(request).await?.session;
    tracing::info!(invoice_id = %invoice_id, ?scenario, "simulation started");
    while let Some(session) = handle.changed().await {
        println!("{}", serde_json::to_string(&json!({
            "status": session.status,
            "progress": session.progress,
            "elapsed_secs": session.time_elapsed_secs,
            "eta": session.eta_display(),
        }))?);
        if !session.is_running() {
            break;
        }
    }

    let finished = handle.current();
    print(&finished)?;
    if let Some(report) = finished.error_report() {
        print(&report)?;
    }
    if finished.status == FelStatus::Authorized {
        let document = coordinator.download_document(invoice_id).await?;
        println!("{}", String::from_utf8_lossy(&document));
    }
    Ok(())
}
