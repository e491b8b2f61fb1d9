//! Domain models flowing through a single dispatch.

pub mod event;
pub mod outcome;
pub mod record;
pub mod routing;

pub use event::NotificationEvent;
pub use outcome::{Outcome, OutcomeStatus, OutputRef};
pub use record::{ProcessingKey, ProcessingRecord, ProcessingStatus};
pub use routing::{RoutingDecision, TransformationKind};
