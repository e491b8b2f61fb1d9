//! Decoding and re-encoding of image payloads

use crate::error::ProcessingError;
use bytes::Bytes;
use image::error::ImageError;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// Identify the container format from the leading bytes.
pub fn guess_format(data: &[u8]) -> Result<ImageFormat, ProcessingError> {
    image::guess_format(data).map_err(|_| {
        ProcessingError::UnsupportedFormat("input is not a recognised image format".to_string())
    })
}

/// Decode an image, distinguishing unreadable headers from damaged pixel data.
pub fn decode(data: &[u8]) -> Result<(DynamicImage, ImageFormat), ProcessingError> {
    let format = guess_format(data)?;

    let (width, height) = ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| match e {
            ImageError::Limits(l) => ProcessingError::CorruptImage(l.to_string()),
            other => ProcessingError::UnsupportedFormat(format!(
                "{} header could not be read: {}",
                format_name(format),
                other
            )),
        })?;

    let img = ImageReader::with_format(Cursor::new(data), format)
        .decode()
        .map_err(|e| {
            ProcessingError::CorruptImage(format!(
                "{} {}x{} pixel data could not be decoded: {}",
                format_name(format),
                width,
                height,
                e
            ))
        })?;

    tracing::debug!(
        format = format_name(format),
        width = width,
        height = height,
        color = ?img.color(),
        "Image decoded"
    );

    Ok((img, format))
}

/// Encode `img` as `format`, converting pixels when the encoder rejects the colour type.
///
/// Falls back to PNG when no conversion is accepted. Returns the bytes and the format
/// actually written.
pub fn encode(
    img: &DynamicImage,
    format: ImageFormat,
) -> Result<(Bytes, ImageFormat), ProcessingError> {
    let mut last_error = None;

    for candidate in conversions(img) {
        match write(&candidate, format) {
            Ok(data) => return Ok((data, format)),
            Err(ImageError::Unsupported(e)) => {
                tracing::debug!(
                    format = format_name(format),
                    color = ?candidate.color(),
                    error = %e,
                    "Encoder rejected colour type, converting"
                );
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(ProcessingError::EncodeFailed(e.to_string())),
        }
    }

    tracing::warn!(
        format = format_name(format),
        error = last_error.as_deref().unwrap_or("unsupported"),
        "No encoder available for input format, writing PNG"
    );
    write(img, ImageFormat::Png)
        .map(|data| (data, ImageFormat::Png))
        .map_err(|e| ProcessingError::EncodeFailed(e.to_string()))
}

fn write(img: &DynamicImage, format: ImageFormat) -> Result<Bytes, ImageError> {
    let estimated_size = (img.width() as usize) * (img.height() as usize);
    let mut buffer = Vec::with_capacity(estimated_size);
    img.write_to(&mut Cursor::new(&mut buffer), format)?;
    Ok(Bytes::from(buffer))
}

/// The image itself, then progressively simpler 8-bit pixel layouts of it.
fn conversions(img: &DynamicImage) -> Vec<DynamicImage> {
    let color = img.color();
    let grey = matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    );

    let mut candidates = vec![img.clone()];
    let mut push = |converted: DynamicImage| {
        if converted.color() != color && !candidates.iter().any(|c| c.color() == converted.color())
        {
            candidates.push(converted);
        }
    };

    if color.has_alpha() {
        push(if grey {
            DynamicImage::ImageLumaA8(img.to_luma_alpha8())
        } else {
            DynamicImage::ImageRgba8(img.to_rgba8())
        });
    }
    push(if grey {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    });
    push(DynamicImage::ImageRgb8(img.to_rgb8()));
    push(DynamicImage::ImageRgba8(img.to_rgba8()));

    candidates
}

pub fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("image")
}
