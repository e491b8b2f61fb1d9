use image::DynamicImage;

/// Luminance conversion
pub struct ImageGreyscale;

impl ImageGreyscale {
    /// Single luminance channel; an alpha channel is kept and bit depth is preserved.
    pub fn apply(img: &DynamicImage) -> DynamicImage {
        img.grayscale()
    }
}
