use std::convert::Infallible;
use std::str::FromStr;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};

use mercaderp_auth::Role;
use mercaderp_inventory::{ActionId, EntryStatus, EntryType};
use mercaderp_invoicing::{FelErrorCode, OrderStatus};

/// Inventory workflow rules and FEL submissions from the command line.
#[derive(Parser, Debug)]
#[command(name = "mercaderp")]
#[command(about = "Inspect workflow rules and run FEL submissions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Outcome the simulated authority will produce.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Authorize,
    Reject,
    Timeout,
    Flaky,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Workflow actions for a role, with the reason behind each decision
    Actions {
        #[arg(value_parser = EntryStatus::from_str)]
        status: EntryStatus,
        #[arg(value_parser = parse_role)]
        role: Role,
        /// The caller owns the entry
        #[arg(long)]
        owner: bool,
    },
    /// Confirmation dialog for an action
    Confirm {
        #[arg(value_parser = ActionId::from_str)]
        action: ActionId,
        entry_number: String,
        #[arg(value_parser = EntryType::from_str)]
        entry_type: EntryType,
    },
    /// Recovery plan for a failed FEL document
    Recover {
        #[arg(value_parser = parse_error_code)]
        code: FelErrorCode,
        attempts: u32,
        max_attempts: u32,
    },
    /// Documents an order may produce
    Eligibility {
        tax_id: String,
        #[arg(default_value = "delivered", value_parser = OrderStatus::from_str)]
        order_status: OrderStatus,
    },
    /// Run one FEL submission end to end against the in-memory authority
    Simulate {
        #[arg(value_enum)]
        outcome: Scenario,
    },
}

fn parse_role(raw: &str) -> Result<Role, Infallible> {
    Ok(Role::new(raw.trim().to_string()))
}

fn parse_error_code(raw: &str) -> Result<FelErrorCode, Infallible> {
    Ok(FelErrorCode::from(raw))
}

impl Cli {
    /// Cross-field checks clap cannot express.
    pub fn validated(self) -> anyhow::Result<Command> {
        if let Command::Recover { attempts, max_attempts, .. } = &self.command {
            if *max_attempts == 0 {
                bail!("max-attempts must be at least 1");
            }
            if attempts > max_attempts {
                bail!("attempts must be between 0 and {max_attempts}");
            }
        }
        Ok(self.command)
    }
}
