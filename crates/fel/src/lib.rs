//! FEL (electronic invoice) issuance.
//!
//! ## Components
//!
//! - `FelTransport`: the fiscal authority boundary (submit, poll, download)
//! - `FelCoordinator`: one cooperative polling session per invoice, with
//!   timeout, bounded manual retry and local cancellation
//! - `ProcessingSession`: the ephemeral progress view a UI renders
//! - `FelEligibilityAdvisor`: document eligibility backed by the order and
//!   client services
//! - `FelConfig`: timings, loadable from the environment

pub mod advisor;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod session;
pub mod transport;

pub use advisor::FelEligibilityAdvisor;
pub use config::{ConfigError, FelConfig};
pub use coordinator::{FelCoordinator, SessionHandle, Submission};
pub use directory::{InMemoryDirectory, OrderClientService, ServiceError};
pub use error::FelError;
pub use session::ProcessingSession;
pub use transport::{FelRequest, FelTransport, InMemoryFelTransport, ScriptedOutcome, TransportError};
