//! imgflow dispatch pipeline
//!
//! Wires the pieces from `imgflow-core`, `imgflow-storage`, `imgflow-db` and
//! `imgflow-processing` into [`Dispatcher::handle`], which turns one raw delivery into one
//! [`Outcome`](imgflow_core::Outcome).
//!
//! Deliveries are at-least-once and may arrive concurrently. The [`IdempotencyGuard`] makes
//! sure that at most one of them does the work for a given upload.

pub mod dispatcher;
pub mod fingerprint;
pub mod guard;
pub mod reporter;
pub mod writer;

pub use dispatcher::Dispatcher;
pub use guard::{AcquireResult, IdempotencyGuard, Lease, ResetResult};
pub use reporter::FailureReporter;
pub use writer::ResultWriter;
