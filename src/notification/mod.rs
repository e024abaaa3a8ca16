//! Notification types, message construction, and dispatching.
//!
//! The dispatcher turns validated request values into provider calls. Repeated
//! data messages are sent as a series of multicast batches whose results are
//! folded into an [`AggregateReport`].

mod aggregate;
mod builder;
mod dispatcher;
mod types;

pub use aggregate::AggregateReport;
pub use builder::MessageBuilder;
pub use dispatcher::{DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher};
pub use types::{
    DataPayload, NotificationContent, Priority, TargetSet, Topic, MAX_BODY_CHARS, MAX_TARGETS,
    MAX_TITLE_CHARS, MESSAGE_INDEX_KEY, TIMESTAMP_KEY,
};
