use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;
use crate::particles::LensParticleField;

/// Splat radius of one particle, in pixels.
const SPLAT_RADIUS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensPointParams {
    pub width: usize,
    pub height: usize,
    /// Pixels per unit of normalized lens coordinate.
    pub lens_radius_px: f32,
    /// Lens distortion in percent, as drawn by the optical model.
    pub distortion: f32,
    pub center: (f32, f32),
}

impl LensPointParams {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.lens_radius_px.is_finite() && self.distortion.is_finite() {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::RenderLensPoints,
                reason: format!(
                    "lens radius {} distortion {}",
                    self.lens_radius_px, self.distortion
                ),
            })
        }
    }
}

/// Draw every particle as a small opaque splat, skewed by the current distortion.
///
/// Points falling outside the image are clipped.
pub fn render_lens_points(
    session: &ComputeSession,
    field: &LensParticleField,
    params: &LensPointParams,
    out: &mut [u8],
) -> Result<(), ComputeError> {
    params.validate()?;
    expect_len(Kernel::RenderLensPoints, params.width * params.height * 4, out.len())?;

    session.dispatch(Kernel::RenderLensPoints, || {
        let (cx, cy) = params.center;
        let (w, h) = (params.width as i64, params.height as i64);
        let skew = params.distortion / 100.0;

        for particle in field.particles() {
            let (lx, ly) = particle.displaced(skew);
            let px = (cx + lx * params.lens_radius_px).floor() as i64;
            let py = (cy + ly * params.lens_radius_px).floor() as i64;

            for sy in py - SPLAT_RADIUS..=py + SPLAT_RADIUS {
                for sx in px - SPLAT_RADIUS..=px + SPLAT_RADIUS {
                    let inside_splat = (sx - px).pow(2) + (sy - py).pow(2) <= SPLAT_RADIUS.pow(2);
                    if !inside_splat || sx < 0 || sy < 0 || sx >= w || sy >= h {
                        continue;
                    }
                    let i = ((sy * w + sx) * 4) as usize;
                    out[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
                }
            }
        }
        Ok(())
    })
}
