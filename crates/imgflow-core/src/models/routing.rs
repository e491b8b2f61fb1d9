use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// The image operation a routed object receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationKind {
    Resize,
    Greyscale,
    ExifExtract,
}

impl TransformationKind {
    /// Short name used in default output prefixes (`processed/<slug>/`).
    pub fn slug(&self) -> &'static str {
        match self {
            TransformationKind::Resize => "resize",
            TransformationKind::Greyscale => "greyscale",
            TransformationKind::ExifExtract => "exif",
        }
    }
}

impl Display for TransformationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for TransformationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "resize" => Ok(TransformationKind::Resize),
            "greyscale" | "grayscale" => Ok(TransformationKind::Greyscale),
            "exif" | "exif_extract" | "exifextract" => Ok(TransformationKind::ExifExtract),
            _ => Err(anyhow::anyhow!("Invalid transformation kind: {}", s)),
        }
    }
}

/// Where a routed object goes and what happens to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub transformation_kind: TransformationKind,
    pub input_key: String,
    pub output_prefix: String,
    /// Full key of the derived artifact under `output_prefix`
    pub output_key: String,
}
