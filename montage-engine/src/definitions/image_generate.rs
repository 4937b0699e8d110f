//! Image generation pipeline
//!
//! Thumbnails, logos and banners. Technical parameters come from the prompt
//! when it states them and from per-type defaults otherwise.

use async_trait::async_trait;
use tracing::info;

use montage_core::domain::RecordStatus;
use montage_core::domain::image::{ImageFormat, ImageGeneration, ImageKind, ImageParams};
use montage_core::domain::instance::DefinitionName;

use super::Pipeline;
use crate::collaborators::Collaborators;
use crate::context::StepContext;
use crate::error::{Interrupt, StepError};

pub struct ImageGeneratePipeline {
    collaborators: Collaborators,
}

impl ImageGeneratePipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

struct Defaults {
    ratio: (u32, u32),
    width: u32,
    height: u32,
    format: ImageFormat,
}

fn defaults(kind: ImageKind) -> Defaults {
    match kind {
        ImageKind::Logo => Defaults {
            ratio: (1, 1),
            width: 800,
            height: 800,
            format: ImageFormat::Png,
        },
        ImageKind::Banner => Defaults {
            ratio: (16, 9),
            width: 2560,
            height: 1440,
            format: ImageFormat::Png,
        },
        ImageKind::Thumbnail => Defaults {
            ratio: (16, 9),
            width: 1280,
            height: 720,
            format: ImageFormat::Jpg,
        },
    }
}

fn kind_label(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Thumbnail => "thumbnail",
        ImageKind::Logo => "logo",
        ImageKind::Banner => "banner",
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn parse_pair(token: &str, separators: &[char]) -> Option<(u32, u32)> {
    let (left, right) = token.split_once(separators)?;
    let left = left.parse::<u32>().ok().filter(|v| *v > 0)?;
    let right = right.parse::<u32>().ok().filter(|v| *v > 0)?;
    Some((left, right))
}

/// Derives model parameters from the request prompt and type
///
/// An explicit `W:H` ratio, `WxH` size or format word in the prompt wins.
/// A ratio alone keeps the type's default width; a size alone implies its
/// reduced ratio.
pub fn derive_params(prompt: &str, kind: ImageKind) -> ImageParams {
    let defaults = defaults(kind);

    let mut ratio = None;
    let mut size = None;
    let mut format = None;

    for token in prompt.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();

        if ratio.is_none() {
            ratio = parse_pair(&token, &[':']);
        }
        if size.is_none() {
            size = parse_pair(&token, &['x', '×']);
        }
        if format.is_none() {
            format = match token.as_str() {
                "png" => Some(ImageFormat::Png),
                "jpg" | "jpeg" => Some(ImageFormat::Jpg),
                "webp" => Some(ImageFormat::Webp),
                _ => None,
            };
        }
    }

    let ((rw, rh), width, height) = match (ratio, size) {
        (Some(ratio), Some((w, h))) => (ratio, w, h),
        (Some((rw, rh)), None) => {
            let height = (defaults.width as f64 * rh as f64 / rw as f64).round() as u32;
            ((rw, rh), defaults.width, height)
        }
        (None, Some((w, h))) => {
            let d = gcd(w, h);
            ((w / d, h / d), w, h)
        }
        (None, None) => (defaults.ratio, defaults.width, defaults.height),
    };

    let format = format.unwrap_or(defaults.format);
    let aspect_ratio = format!("{rw}:{rh}");

    let prompt = format!(
        "{}\n\nCreate a YouTube {} with aspect ratio {}, {}x{} pixels, {} format.",
        prompt.trim(),
        kind_label(kind),
        aspect_ratio,
        width,
        height,
        format.extension()
    );

    ImageParams {
        prompt,
        aspect_ratio,
        width,
        height,
        format,
    }
}

#[async_trait]
impl Pipeline for ImageGeneratePipeline {
    fn definition(&self) -> DefinitionName {
        DefinitionName::ImageGenerate
    }

    async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt> {
        let image_id = ctx.parameter_str("imageId")?;
        let c = &self.collaborators;

        ctx.step("mark-processing", || async {
            c.store
                .update_image_generation(&image_id, RecordStatus::Processing, None)
                .await
        })
        .await?;

        let request: ImageGeneration = ctx
            .step("get-image-generation", || async {
                c.store
                    .get_image_generation(&image_id)
                    .await?
                    .ok_or_else(|| {
                        StepError::terminal(format!("image generation {image_id} not found"))
                    })
            })
            .await?;

        let params: ImageParams = ctx
            .step("derive-image-params", || async {
                Ok(derive_params(&request.prompt, request.kind))
            })
            .await?;

        let image_url: String = ctx
            .step("generate-image", || async {
                let reference = request.reference_image.as_ref().map(|r| r.url.as_str());
                let bytes = c.images.generate(&params, reference).await?;
                if bytes.is_empty() {
                    return Err(StepError::terminal("image model returned no image"));
                }
                let file_name = format!("image-{image_id}.{}", params.format.extension());
                c.storage.upload(bytes, &file_name).await
            })
            .await?;

        ctx.step("mark-completed", || async {
            c.store
                .update_image_generation(&image_id, RecordStatus::Completed, Some(&image_url))
                .await
        })
        .await?;

        info!(instance_id = %ctx.instance_id(), "Image {} generated at {}", image_id, image_url);
        Ok(())
    }

    async fn on_failure(&self, ctx: &StepContext, _error: &str) -> Result<(), StepError> {
        let image_id = ctx.correlation_key();
        ctx.retry_policy()
            .run("mark-failed", || {
                self.collaborators
                    .store
                    .update_image_generation(image_id, RecordStatus::Failed, None)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logo_defaults() {
        let params = derive_params("A minimalist fox head for a coffee brand", ImageKind::Logo);
        assert_eq!(params.aspect_ratio, "1:1");
        assert_eq!((params.width, params.height), (800, 800));
        assert_eq!(params.format, ImageFormat::Png);
        assert!(params.prompt.starts_with("A minimalist fox head"));
        assert!(params.prompt.contains("YouTube logo"));
    }

    #[test]
    fn test_type_defaults() {
        let banner = derive_params("mountains at dawn", ImageKind::Banner);
        assert_eq!((banner.width, banner.height, banner.format), (2560, 1440, ImageFormat::Png));

        let thumbnail = derive_params("shocked face", ImageKind::Thumbnail);
        assert_eq!(thumbnail.aspect_ratio, "16:9");
        assert_eq!((thumbnail.width, thumbnail.height), (1280, 720));
        assert_eq!(thumbnail.format, ImageFormat::Jpg);
    }

    #[test]
    fn test_explicit_ratio_keeps_default_width() {
        let params = derive_params("retro poster, 4:3 please", ImageKind::Thumbnail);
        assert_eq!(params.aspect_ratio, "4:3");
        assert_eq!((params.width, params.height), (1280, 960));
    }

    #[test]
    fn test_explicit_size_implies_ratio() {
        let params = derive_params("render at 1920x1080 as WEBP.", ImageKind::Logo);
        assert_eq!(params.aspect_ratio, "16:9");
        assert_eq!((params.width, params.height), (1920, 1080));
        assert_eq!(params.format, ImageFormat::Webp);
    }

    #[test]
    fn test_explicit_ratio_and_size() {
        let params = derive_params("(21:9) 2520x1080 jpeg", ImageKind::Banner);
        assert_eq!(params.aspect_ratio, "21:9");
        assert_eq!((params.width, params.height), (2520, 1080));
        assert_eq!(params.format, ImageFormat::Jpg);
    }

    #[test]
    fn test_zero_dimensions_are_ignored() {
        let params = derive_params("0x0 0:5", ImageKind::Logo);
        assert_eq!(params.aspect_ratio, "1:1");
        assert_eq!((params.width, params.height), (800, 800));
    }
}
