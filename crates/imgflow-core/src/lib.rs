//! imgflow Core Library
//!
//! This crate provides the domain models, error types, configuration, envelope parsing
//! and prefix routing shared by every imgflow component. Nothing in here performs I/O;
//! storage and marker backends live in `imgflow-storage` and `imgflow-db`.

pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod router;
pub mod storage_types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    BaseConfig, Config, FingerprintMode, IdempotencyConfig, MarkerConfig, PipelineConfig,
    ResizeBounds, RetryPolicy, RouteConfig, StorageConfig,
};
pub use envelope::EnvelopeParser;
pub use error::{ErrorKind, ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    NotificationEvent, Outcome, OutcomeStatus, OutputRef, ProcessingKey, ProcessingRecord,
    ProcessingStatus, RoutingDecision, TransformationKind,
};
pub use router::PrefixRouter;
pub use storage_types::{MarkerBackend, StorageBackend};
