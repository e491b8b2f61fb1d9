use crate::decode::guess_format;
use crate::error::ProcessingError;
use chrono::NaiveDateTime;
use exif::{Exif, Field, In, Reader, Tag, Value};
use image::ImageFormat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Undefined-typed values larger than this (maker notes, embedded blobs) are left out of `tags`.
const MAX_UNDEFINED_TAG_BYTES: usize = 64;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CameraInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
}

impl CameraInfo {
    fn is_empty(&self) -> bool {
        self.make.is_none() && self.model.is_none() && self.lens.is_none()
    }
}

/// Decimal degrees, south and west negative. Altitude in metres, below sea level negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Metadata extracted from an image, serialized as the JSON artifact.
///
/// An image without EXIF yields an empty document, which serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsPosition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ExifDocument {
    pub fn is_empty(&self) -> bool {
        self.camera.is_none() && self.captured_at.is_none() && self.gps.is_none() && self.tags.is_empty()
    }
}

/// EXIF metadata extraction
pub struct ExifExtractor;

impl ExifExtractor {
    pub fn extract(data: &[u8]) -> Result<ExifDocument, ProcessingError> {
        let format = guess_format(data)?;
        if !matches!(
            format,
            ImageFormat::Jpeg
                | ImageFormat::Png
                | ImageFormat::Tiff
                | ImageFormat::WebP
                | ImageFormat::Avif
        ) {
            return Ok(ExifDocument::default());
        }

        let exif = match Reader::new().read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(ExifDocument::default()),
            Err(e) => {
                return Err(ProcessingError::CorruptImage(format!(
                    "EXIF block could not be parsed: {}",
                    e
                )))
            }
        };

        let document = Self::build_document(&exif);
        tracing::debug!(
            tag_count = document.tags.len(),
            has_gps = document.gps.is_some(),
            "EXIF metadata extracted"
        );
        Ok(document)
    }

    fn build_document(exif: &Exif) -> ExifDocument {
        let camera = CameraInfo {
            make: ascii(exif, Tag::Make),
            model: ascii(exif, Tag::Model),
            lens: ascii(exif, Tag::LensModel),
        };

        let captured_at = ascii(exif, Tag::DateTimeOriginal)
            .or_else(|| ascii(exif, Tag::DateTime))
            .and_then(|raw| normalize_datetime(&raw));

        let tags = exif
            .fields()
            .filter(|field| field.ifd_num == In::PRIMARY && include_in_tags(field))
            .map(|field| {
                (
                    field.tag.to_string(),
                    field.display_value().with_unit(exif).to_string(),
                )
            })
            .collect();

        ExifDocument {
            camera: (!camera.is_empty()).then_some(camera),
            captured_at,
            gps: gps_position(exif),
            tags,
        }
    }
}

fn include_in_tags(field: &Field) -> bool {
    match &field.value {
        Value::Undefined(bytes, _) => bytes.len() <= MAX_UNDEFINED_TAG_BYTES,
        _ => true,
    }
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// `2024:05:01 10:20:30` becomes `2024-05-01T10:20:30`; unparseable values are dropped.
fn normalize_datetime(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw, EXIF_DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn gps_position(exif: &Exif) -> Option<GpsPosition> {
    let latitude = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S')?;
    let longitude = coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W')?;

    let altitude = exif
        .get_field(Tag::GPSAltitude, In::PRIMARY)
        .and_then(|field| match &field.value {
            Value::Rational(values) => values.first().map(|r| r.to_f64()),
            _ => None,
        })
        .filter(|value| value.is_finite())
        .map(|value| {
            let below_sea_level = exif
                .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
                == Some(1);
            if below_sea_level {
                -value
            } else {
                value
            }
        });

    Some(GpsPosition {
        latitude,
        longitude,
        altitude,
    })
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, negative_ref: char) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let degrees = match &field.value {
        Value::Rational(values) if !values.is_empty() => values
            .iter()
            .take(3)
            .zip([1.0, 60.0, 3600.0])
            .map(|(r, divisor)| r.to_f64() / divisor)
            .sum::<f64>(),
        _ => return None,
    };
    if !degrees.is_finite() {
        return None;
    }

    let negative = ascii(exif, ref_tag)
        .and_then(|r| r.chars().next())
        .map(|c| c.eq_ignore_ascii_case(&negative_ref))
        .unwrap_or(false);
    Some(if negative { -degrees } else { degrees })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::Rational;
    use image::{DynamicImage, Rgb, RgbImage};

    /// JPEG with an APP1 EXIF segment carrying `fields`, placed right after SOI.
    pub(crate) fn jpeg_with_exif(width: u32, height: u32, fields: &[Field]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 40])
        }));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let segment_len = (2 + 6 + tiff.len()) as u16;
        let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
        out.extend_from_slice(&jpeg[..2]);
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    pub(crate) fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn text(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn dms(d: u32, m: u32, s: u32) -> Value {
        Value::Rational(vec![
            Rational::from((d, 1)),
            Rational::from((m, 1)),
            Rational::from((s, 1)),
        ])
    }

    #[test]
    fn test_extracts_camera_and_timestamp() {
        let data = jpeg_with_exif(
            8,
            8,
            &[
                field(Tag::Make, text("Acme")),
                field(Tag::Model, text("Snapper 3000")),
                field(Tag::DateTimeOriginal, text("2024:05:01 10:20:30")),
            ],
        );

        let doc = ExifExtractor::extract(&data).unwrap();
        let camera = doc.camera.as_ref().unwrap();
        assert_eq!(camera.make.as_deref(), Some("Acme"));
        assert_eq!(camera.model.as_deref(), Some("Snapper 3000"));
        assert_eq!(camera.lens, None);
        assert_eq!(doc.captured_at.as_deref(), Some("2024-05-01T10:20:30"));
        assert!(doc.tags.contains_key("Make"));
    }

    #[test]
    fn test_extracts_signed_gps() {
        let data = jpeg_with_exif(
            8,
            8,
            &[
                field(Tag::GPSLatitude, dms(33, 30, 0)),
                field(Tag::GPSLatitudeRef, text("S")),
                field(Tag::GPSLongitude, dms(70, 45, 0)),
                field(Tag::GPSLongitudeRef, text("W")),
                field(Tag::GPSAltitude, Value::Rational(vec![Rational::from((12, 1))])),
                field(Tag::GPSAltitudeRef, Value::Byte(vec![1])),
            ],
        );

        let gps = ExifExtractor::extract(&data).unwrap().gps.unwrap();
        assert!((gps.latitude + 33.5).abs() < 1e-9);
        assert!((gps.longitude + 70.75).abs() < 1e-9);
        assert_eq!(gps.altitude, Some(-12.0));
    }

    #[test]
    fn test_image_without_exif_is_empty_document() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let doc = ExifExtractor::extract(&png).unwrap();
        assert!(doc.is_empty());
        assert_eq!(serde_json::to_string(&doc).unwrap(), "{}");
    }

    #[test]
    fn test_non_image_is_unsupported() {
        assert!(matches!(
            ExifExtractor::extract(b"plain text"),
            Err(ProcessingError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unparseable_datetime_is_dropped() {
        assert_eq!(normalize_datetime("sometime last week"), None);
        assert_eq!(
            normalize_datetime("2020:01:02 03:04:05").as_deref(),
            Some("2020-01-02T03:04:05")
        );
    }
}
