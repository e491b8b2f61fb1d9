//! imgflow marker store
//!
//! Durable processing records keyed by processing key. Every state change goes through a
//! conditional write (`insert_if_absent`, `update_if`), which is what keeps two concurrent
//! deliveries of the same upload from both doing the work.

pub mod factory;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use factory::create_marker_store;
pub use imgflow_core::MarkerBackend;
pub use memory::InMemoryMarkerStore;
#[cfg(feature = "postgres")]
pub use postgres::PgMarkerStore;
pub use traits::{MarkerError, MarkerResult, MarkerStore};
