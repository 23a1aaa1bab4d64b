//! Image Normalizer: decode, shrink to a short-side bound and encode as WebP thumbnails.

use crate::config::CacheConfig;
use crate::error::{AppError, Result, Stage, StageExt};
use image::{DynamicImage, imageops};
use std::fs;
use std::ops::Deref;
use std::path::Path;

/// File extension of generated thumbnails.
pub const THUMBNAIL_EXTENSION: &str = "webp";

/// Decode raster bytes in any supported format.
///
/// The general decoder is tried first; lossy WebP variants it rejects go
/// through libwebp.
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    match image::load_from_memory(data) {
        Ok(img) => Ok(img),
        Err(primary) => webp::Decoder::new(data)
            .decode()
            .map(|img| img.to_image())
            .ok_or_else(|| AppError::Decode(primary.to_string())),
    }
}

/// Output size for a `width` x `height` source bounded by `short_side`.
///
/// Returns `None` when the image is already small enough. Otherwise the
/// short side becomes exactly `short_side` and the long side is scaled by the
/// same factor and rounded.
pub fn target_dimensions(width: u32, height: u32, short_side: u32) -> Option<(u32, u32)> {
    let short = width.min(height);
    if short <= short_side {
        return None;
    }

    let factor = short_side as f64 / short as f64;
    let scale = |v: u32| ((v as f64 * factor).round() as u32).max(1);

    if width <= height {
        Some((short_side, scale(height)))
    } else {
        Some((scale(width), short_side))
    }
}

/// Produces thumbnails of a fixed short side and quality.
#[derive(Debug, Clone, Copy)]
pub struct Thumbnailer {
    size: u32,
    quality: f32,
}

impl Thumbnailer {
    /// Create with a short-side bound in pixels and a 0-100 quality.
    pub fn new(size: u32, quality: u8) -> Self {
        Self {
            size,
            quality: f32::from(quality.min(100)),
        }
    }

    /// Create from the `[cache]` config section.
    pub fn from_config(cache: &CacheConfig) -> Self {
        Self::new(cache.thumbnail_size, cache.thumbnail_quality)
    }

    /// Shrink `img` with a bilinear filter, or pass it through when small.
    pub fn normalize(&self, img: DynamicImage) -> DynamicImage {
        match target_dimensions(img.width(), img.height(), self.size) {
            Some((w, h)) => {
                DynamicImage::ImageRgba8(imageops::resize(&img, w, h, imageops::FilterType::Triangle))
            }
            None => img,
        }
    }

    /// Encode as lossy WebP.
    pub fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>> {
        let converted;
        let img = match img {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
            other => {
                converted = DynamicImage::ImageRgba8(other.to_rgba8());
                &converted
            }
        };

        let encoder = webp::Encoder::from_image(img)
            .map_err(|reason| AppError::Internal(format!("webp encoder: {}", reason)))?;
        Ok(encoder.encode(self.quality).deref().to_owned())
    }

    /// Decode `data`, normalize and write the thumbnail to `output`.
    pub fn thumbnail_from_bytes(&self, data: &[u8], output: &Path) -> Result<()> {
        let img = decode(data).stage(Stage::Decode)?;
        self.write(img, output)
    }

    /// Decode the image file at `source`, normalize and write the thumbnail.
    pub fn thumbnail_from_file(&self, source: &Path, output: &Path) -> Result<()> {
        let data = fs::read(source).stage(Stage::Decode)?;
        self.thumbnail_from_bytes(&data, output)
    }

    fn write(&self, img: DynamicImage, output: &Path) -> Result<()> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(AppError::Decode("empty image".into()).at(Stage::Resize));
        }

        let img = self.normalize(img);
        let webp = self.encode(&img).stage(Stage::Encode)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).stage(Stage::DirCreate)?;
        }

        // Readers never see a half-written thumbnail at `output`.
        let tmp = output.with_extension(format!("{}.tmp", THUMBNAIL_EXTENSION));
        fs::write(&tmp, &webp).stage(Stage::Write)?;
        if let Err(e) = fs::rename(&tmp, output) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::warn!(
                    path = %tmp.display(),
                    error = %cleanup,
                    "Failed to remove temporary thumbnail"
                );
            }
            return Err(AppError::Io(e).at(Stage::Write));
        }

        tracing::debug!(
            output = %output.display(),
            source_width = width,
            source_height = height,
            width = img.width(),
            height = img.height(),
            bytes = webp.len(),
            "Wrote thumbnail"
        );
        Ok(())
    }
}
