//! imgflow image transformations
//!
//! Pure, CPU-bound code: bytes in, [`Artifact`] out. Nothing here touches storage or the
//! marker store, so callers are free to run it on a blocking thread.

pub mod artifact;
pub mod decode;
pub mod error;
pub mod executor;
pub mod image;

pub use artifact::{Artifact, ArtifactKind};
pub use error::ProcessingError;
pub use executor::TransformationExecutor;
pub use crate::image::metadata::{CameraInfo, ExifDocument, GpsPosition};
