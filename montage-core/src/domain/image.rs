//! Image generation domain types

use serde::{Deserialize, Serialize};

use super::RecordStatus;

/// A standalone image generation request held by the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGeneration {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub image: Option<String>,
    pub status: RecordStatus,
    /// Optional image the model should use as additional input
    pub reference_image: Option<ReferenceImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageKind {
    Thumbnail,
    Logo,
    Banner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Technical parameters handed to the image model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParams {
    /// Prompt enriched with the technical requirements
    pub prompt: String,
    /// Aspect ratio as "W:H"
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}
