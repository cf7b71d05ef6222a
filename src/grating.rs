//! Diffraction grating texture, matched to the current image resolution.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::LoadError;

/// Grating bitmap at exactly the image's size. Immutable once built.
#[derive(Debug, Clone)]
pub struct GratingTexture {
    image: RgbaImage,
}

impl GratingTexture {
    /// Load from disk and resize to `width x height` if needed.
    pub fn load(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|source| LoadError::Texture {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Grating texture loaded"
        );
        Ok(Self::from_image(image, width, height))
    }

    /// Wrap an existing bitmap, resizing to `width x height` if needed.
    pub fn from_image(image: RgbaImage, width: u32, height: u32) -> Self {
        if image.dimensions() == (width, height) {
            return Self { image };
        }
        tracing::info!(
            from = ?image.dimensions(),
            to = ?(width, height),
            "Grating texture resized"
        );
        Self {
            image: imageops::resize(&image, width, height, FilterType::Triangle),
        }
    }

    /// Radial spoke pattern, a stand-in for the lens fibre gratings.
    pub fn radial(width: u32, height: u32, spokes: u32) -> Self {
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let image = RgbaImage::from_fn(width, height, |x, y| {
            let angle = (y as f32 + 0.5 - cy).atan2(x as f32 + 0.5 - cx);
            let wave = (angle * spokes as f32).cos() * 0.5 + 0.5;
            let v = (wave.powi(8) * 255.0) as u8;
            Rgba([v, v, v, 255])
        });
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Transmission in `[0, 1]` at integer texel `(x, y)`, clamped to the edge.
    pub fn transmission(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.image.width() as i64 - 1) as u32;
        let y = y.clamp(0, self.image.height() as i64 - 1) as u32;
        self.image.get_pixel(x, y).0[0] as f32 / 255.0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}
