use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Events are append-only records a persistence layer stores after each
/// transition; they are never edited once emitted.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.entry.status_changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the event.
    fn occurred_at(&self) -> DateTime<Utc>;
}
