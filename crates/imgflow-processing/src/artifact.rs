use crate::image::metadata::ExifDocument;
use bytes::Bytes;
use image::ImageFormat;

/// What a transformation produced
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactKind {
    Image {
        format: ImageFormat,
        width: u32,
        height: u32,
    },
    Metadata(ExifDocument),
}

/// Output of a transformation, ready to be written to the object store
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    pub content_type: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn image(data: Bytes, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            content_type: format.to_mime_type().to_string(),
            kind: ArtifactKind::Image {
                format,
                width,
                height,
            },
        }
    }

    pub fn metadata(data: Bytes, document: ExifDocument) -> Self {
        Self {
            data,
            content_type: "application/json".to_string(),
            kind: ArtifactKind::Metadata(document),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Dimensions of an image artifact.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.kind {
            ArtifactKind::Image { width, height, .. } => Some((width, height)),
            ArtifactKind::Metadata(_) => None,
        }
    }
}
