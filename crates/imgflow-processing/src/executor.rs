//! Applies a routed transformation to an object's bytes

use crate::artifact::Artifact;
use crate::decode::{decode, encode, format_name};
use crate::image::{ExifExtractor, ImageGreyscale, ImageOrientation, ImageResize};
use bytes::Bytes;
use image::GenericImageView;
use imgflow_core::{PipelineError, ResizeBounds, TransformationKind};
use std::time::Instant;

/// Runs one transformation kind over an encoded image.
///
/// Stateless apart from its configuration: the same input and kind always produce the same
/// artifact, so a retried delivery overwrites its earlier output with identical bytes.
#[derive(Debug, Clone)]
pub struct TransformationExecutor {
    resize: ResizeBounds,
}

impl TransformationExecutor {
    pub fn new(resize: ResizeBounds) -> Self {
        Self { resize }
    }

    pub fn resize_bounds(&self) -> &ResizeBounds {
        &self.resize
    }

    pub fn execute(&self, kind: TransformationKind, data: &[u8]) -> Result<Artifact, PipelineError> {
        let start = Instant::now();

        let artifact = match kind {
            TransformationKind::Resize => self.resize(data)?,
            TransformationKind::Greyscale => Self::greyscale(data)?,
            TransformationKind::ExifExtract => Self::exif(data)?,
        };

        tracing::info!(
            transformation = %kind,
            input_bytes = data.len(),
            output_bytes = artifact.size_bytes(),
            content_type = %artifact.content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transformation completed"
        );

        Ok(artifact)
    }

    fn resize(&self, data: &[u8]) -> Result<Artifact, PipelineError> {
        let (img, format) = decode(data)?;
        let img = if self.resize.auto_orient {
            ImageOrientation::apply_exif_orientation(img, data)
        } else {
            img
        };

        let resized = ImageResize::resize_to_fit(img, &self.resize);
        let (width, height) = resized.dimensions();
        let (encoded, written) = encode(&resized, format)?;
        if written != format {
            tracing::warn!(
                input_format = format_name(format),
                output_format = format_name(written),
                "Resized image written in fallback format"
            );
        }

        Ok(Artifact::image(encoded, written, width, height))
    }

    fn greyscale(data: &[u8]) -> Result<Artifact, PipelineError> {
        let (img, format) = decode(data)?;
        let grey = ImageGreyscale::apply(&img);
        let (width, height) = grey.dimensions();
        let (encoded, written) = encode(&grey, format)?;
        Ok(Artifact::image(encoded, written, width, height))
    }

    fn exif(data: &[u8]) -> Result<Artifact, PipelineError> {
        let document = ExifExtractor::extract(data)?;
        let json = serde_json::to_vec(&document)
            .map_err(|e| {
            PipelineError::Unprocessable(format!("Failed to serialize EXIF document: {}", e))
        })?;
        Ok(Artifact::metadata(Bytes::from(json), document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::decode::guess_format;
    use crate::image::metadata::tests::{field, jpeg_with_exif};
    use exif::{Tag, Value};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use imgflow_core::ErrorKind;
    use std::io::Cursor;

    fn executor(max: u32, auto_orient: bool) -> TransformationExecutor {
        TransformationExecutor::new(ResizeBounds {
            max_width: max,
            max_height: max,
            auto_orient,
        })
    }

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 200])
        }));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn test_resize_fits_within_bounds() {
        let data = encoded(800, 600, ImageFormat::Jpeg);
        let artifact = executor(200, true)
            .execute(TransformationKind::Resize, &data)
            .unwrap();

        assert_eq!(artifact.dimensions(), Some((200, 150)));
        assert_eq!(artifact.content_type, "image/jpeg");
        assert_eq!(guess_format(&artifact.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_resize_applies_exif_orientation() {
        // Orientation 6: stored landscape, displayed portrait
        let data = jpeg_with_exif(40, 20, &[field(Tag::Orientation, Value::Short(vec![6]))]);

        let oriented = executor(1024, true)
            .execute(TransformationKind::Resize, &data)
            .unwrap();
        assert_eq!(oriented.dimensions(), Some((20, 40)));

        let raw = executor(1024, false)
            .execute(TransformationKind::Resize, &data)
            .unwrap();
        assert_eq!(raw.dimensions(), Some((40, 20)));
    }

    #[test]
    fn test_greyscale_is_idempotent_for_png() {
        let data = encoded(16, 16, ImageFormat::Png);
        let exec = executor(1024, true);

        let once = exec.execute(TransformationKind::Greyscale, &data).unwrap();
        let twice = exec
            .execute(TransformationKind::Greyscale, &once.data)
            .unwrap();

        assert_eq!(once.content_type, "image/png");
        assert_eq!(once.data, twice.data);
    }

    #[test]
    fn test_greyscale_jpeg_stays_single_channel() {
        let data = encoded(32, 24, ImageFormat::Jpeg);
        let exec = executor(1024, true);

        let once = exec.execute(TransformationKind::Greyscale, &data).unwrap();
        let twice = exec
            .execute(TransformationKind::Greyscale, &once.data)
            .unwrap();

        assert_eq!(once.content_type, "image/jpeg");
        assert_eq!(twice.content_type, "image/jpeg");
        let first = image::load_from_memory(&once.data).unwrap();
        let second = image::load_from_memory(&twice.data).unwrap();
        assert_eq!(first.color(), image::ColorType::L8);
        assert_eq!(second.color(), image::ColorType::L8);
        assert_eq!(first.dimensions(), second.dimensions());

        // Lossy re-encode: close, not byte-identical
        let (a, b) = (first.to_luma8(), second.to_luma8());
        let total: u64 = a
            .pixels()
            .zip(b.pixels())
            .map(|(p, q)| u64::from(p[0].abs_diff(q[0])))
            .sum();
        let mean = total / u64::from(a.width() * a.height());
        assert!(mean <= 4, "mean luminance drift {}", mean);
    }

    #[test]
    fn test_exif_without_metadata_is_empty_object() {
        let data = encoded(8, 8, ImageFormat::Png);
        let artifact = executor(1024, true)
            .execute(TransformationKind::ExifExtract, &data)
            .unwrap();

        assert_eq!(artifact.content_type, "application/json");
        assert_eq!(&artifact.data[..], b"{}");
        assert!(matches!(artifact.kind, ArtifactKind::Metadata(ref doc) if doc.is_empty()));
    }

    #[test]
    fn test_exif_document_serialized() {
        let data = jpeg_with_exif(8, 8, &[field(Tag::Make, Value::Ascii(vec![b"Acme".to_vec()]))]);
        let artifact = executor(1024, true)
            .execute(TransformationKind::ExifExtract, &data)
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&artifact.data).unwrap();
        assert_eq!(json["camera"]["make"], "Acme");
    }

    #[test]
    fn test_garbage_input_is_unsupported_for_every_kind() {
        let exec = executor(1024, true);
        for kind in [
            TransformationKind::Resize,
            TransformationKind::Greyscale,
            TransformationKind::ExifExtract,
        ] {
            let err = exec.execute(kind, b"\x00\x01 not an image").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "{}", kind);
        }
    }
}
