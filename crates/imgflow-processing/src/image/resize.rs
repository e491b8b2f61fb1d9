use image::{DynamicImage, GenericImageView};
use imgflow_core::ResizeBounds;

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Largest size with the same aspect ratio that fits inside the bounds. Never upscales.
    pub fn fit_within(
        orig_width: u32,
        orig_height: u32,
        max_width: u32,
        max_height: u32,
    ) -> (u32, u32) {
        if orig_width == 0 || orig_height == 0 {
            return (orig_width, orig_height);
        }

        let scale_width = max_width as f64 / orig_width as f64;
        let scale_height = max_height as f64 / orig_height as f64;
        let scale = scale_width.min(scale_height).min(1.0);

        let width = ((orig_width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
        let height = ((orig_height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
        (width, height)
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> image::imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            image::imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            image::imageops::FilterType::CatmullRom
        } else {
            image::imageops::FilterType::Lanczos3
        }
    }

    /// Scale down to fit `bounds`; images that already fit are returned as they are.
    pub fn resize_to_fit(img: DynamicImage, bounds: &ResizeBounds) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let (width, height) =
            Self::fit_within(orig_width, orig_height, bounds.max_width, bounds.max_height);

        if (width, height) == (orig_width, orig_height) {
            return img;
        }

        let filter = Self::select_filter(orig_width, orig_height, width, height);
        tracing::debug!(
            from_width = orig_width,
            from_height = orig_height,
            to_width = width,
            to_height = height,
            filter = ?filter,
            "Resizing image"
        );
        img.resize_exact(width, height, filter)
    }
}
