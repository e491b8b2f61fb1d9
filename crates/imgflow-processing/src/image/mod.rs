//! Image operations
//!
//! - Pixel transforms (resize, greyscale, orientation)
//! - EXIF metadata extraction (metadata)

pub mod greyscale;
pub mod metadata;
pub mod orientation;
pub mod resize;

pub use greyscale::ImageGreyscale;
pub use metadata::ExifExtractor;
pub use orientation::ImageOrientation;
pub use resize::ImageResize;
