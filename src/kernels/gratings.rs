use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;
use crate::grating::GratingTexture;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GratingParams {
    pub width: usize,
    pub height: usize,
    /// Radius of the grating at rest, in pixels.
    pub radius_px: f32,
    /// Radius after this frame's lens deformation.
    pub deformed_radius_px: f32,
    pub center: (f32, f32),
}

impl GratingParams {
    pub fn validate(&self) -> Result<(), ComputeError> {
        let ok = self.radius_px.is_finite()
            && self.radius_px > 0.0
            && self.deformed_radius_px.is_finite()
            && self.deformed_radius_px > 0.0;
        if ok {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::RenderGratings,
                reason: format!(
                    "grating radius {} deformed to {}",
                    self.radius_px, self.deformed_radius_px
                ),
            })
        }
    }
}

/// Render the grating opacity, stretched radially by the deformation.
///
/// Texels are fetched at `center + offset * radius / deformed_radius`, so the
/// pattern expands as the lens deforms. Nothing is drawn beyond the deformed radius.
pub fn render_gratings(
    session: &ComputeSession,
    texture: &GratingTexture,
    params: &GratingParams,
    out: &mut [u8],
) -> Result<(), ComputeError> {
    params.validate()?;
    expect_len(Kernel::RenderGratings, params.width * params.height * 4, out.len())?;
    if (texture.width() as usize, texture.height() as usize) != (params.width, params.height) {
        return Err(ComputeError::DimensionMismatch {
            kernel: Kernel::RenderGratings,
            expected: params.width * params.height,
            actual: (texture.width() * texture.height()) as usize,
        });
    }

    session.dispatch(Kernel::RenderGratings, || {
        let (cx, cy) = params.center;
        let scale = params.radius_px / params.deformed_radius_px;
        out.par_chunks_mut(params.width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let dy = y as f32 + 0.5 - cy;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let dx = x as f32 + 0.5 - cx;
                    if dx * dx + dy * dy > params.deformed_radius_px * params.deformed_radius_px {
                        px.copy_from_slice(&[0, 0, 0, 0]);
                        continue;
                    }
                    let sx = (cx + dx * scale).floor() as i64;
                    let sy = (cy + dy * scale).floor() as i64;
                    let v = (texture.transmission(sx, sy) * 255.0).round() as u8;
                    px.copy_from_slice(&[v, v, v, 255]);
                }
            });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::tests::session;
    use image::{Rgba, RgbaImage};

    fn params(deformed: f32) -> GratingParams {
        GratingParams {
            width: 32,
            height: 32,
            radius_px: 8.0,
            deformed_radius_px: deformed,
            center: (16.0, 16.0),
        }
    }

    #[test]
    fn nothing_outside_deformed_radius() {
        let session = session();
        let texture =
            GratingTexture::from_image(RgbaImage::from_pixel(32, 32, Rgba([255; 4])), 32, 32);
        let mut out = vec![0u8; 32 * 32 * 4];
        render_gratings(&session, &texture, &params(10.0), &mut out).unwrap();

        assert_eq!(out[(16 * 32 + 16) * 4], 255);
        assert_eq!(out[(16 * 32 + 25) * 4], 255);
        assert_eq!(out[(16 * 32 + 28) * 4], 0);
    }

    #[test]
    fn deformation_stretches_pattern() {
        let session = session();
        // a single bright column just right of center
        let texture = GratingTexture::from_image(
            RgbaImage::from_fn(32, 32, |x, _| if x == 18 { Rgba([255; 4]) } else { Rgba([0, 0, 0, 255]) }),
            32,
            32,
        );
        let mut rest = vec![0u8; 32 * 32 * 4];
        let mut stretched = vec![0u8; 32 * 32 * 4];
        render_gratings(&session, &texture, &params(8.0), &mut rest).unwrap();
        render_gratings(&session, &texture, &params(16.0), &mut stretched).unwrap();

        let row = 16 * 32 * 4;
        assert_eq!(rest[row + 18 * 4], 255);
        // at twice the radius the column appears twice as far from center
        assert_eq!(stretched[row + 20 * 4], 255);
        assert_eq!(stretched[row + 18 * 4], 0);
    }

    #[test]
    fn texture_size_must_match() {
        let session = session();
        let texture = GratingTexture::radial(16, 16, 4);
        let mut out = vec![0u8; 32 * 32 * 4];
        assert!(render_gratings(&session, &texture, &params(8.0), &mut out).is_err());
    }
}
