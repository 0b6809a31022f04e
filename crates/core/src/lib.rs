//! `mercaderp-core`: shared domain building blocks.
//!
//! Pure domain primitives only: errors, identifiers, and the aggregate/event
//! contracts the workflow crates implement. No IO lives here.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{AggregateId, UserId};
