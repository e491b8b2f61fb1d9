//! imgflow API Library
//!
//! HTTP push endpoint in front of the dispatcher, plus record inspection, operator reset and
//! health probes.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
