use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilParams {
    pub width: usize,
    pub height: usize,
    pub radius_px: f32,
    pub center: (f32, f32),
}

impl PupilParams {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.radius_px.is_finite() && self.radius_px > 0.0 {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::RenderPupil,
                reason: format!("pupil radius {}", self.radius_px),
            })
        }
    }
}

/// Rasterize the pupil disc: 255 inside, 0 outside, one pixel of antialiasing.
pub fn render_pupil(
    session: &ComputeSession,
    params: &PupilParams,
    out: &mut [u8],
) -> Result<(), ComputeError> {
    params.validate()?;
    expect_len(Kernel::RenderPupil, params.width * params.height * 4, out.len())?;

    session.dispatch(Kernel::RenderPupil, || {
        let (cx, cy) = params.center;
        out.par_chunks_mut(params.width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let dy = y as f32 + 0.5 - cy;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let dx = x as f32 + 0.5 - cx;
                    let dist = (dx * dx + dy * dy).sqrt();
                    let coverage = (params.radius_px - dist + 0.5).clamp(0.0, 1.0);
                    let v = (coverage * 255.0).round() as u8;
                    px.copy_from_slice(&[v, v, v, v]);
                }
            });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::tests::session;

    #[test]
    fn inside_passes_outside_blocks() {
        let session = session();
        let params = PupilParams {
            width: 32,
            height: 32,
            radius_px: 8.0,
            center: (16.0, 16.0),
        };
        let mut out = vec![0u8; 32 * 32 * 4];
        render_pupil(&session, &params, &mut out).unwrap();

        let at = |x: usize, y: usize| out[(y * 32 + x) * 4];
        assert_eq!(at(16, 16), 255);
        assert_eq!(at(18, 13), 255);
        assert_eq!(at(0, 0), 0);
        assert_eq!(at(16, 30), 0);
        // alpha follows transmission
        assert_eq!(out[3], 0);
    }

    #[test]
    fn zero_radius_is_rejected() {
        let session = session();
        let params = PupilParams {
            width: 4,
            height: 4,
            radius_px: 0.0,
            center: (2.0, 2.0),
        };
        let mut out = vec![0u8; 64];
        assert!(render_pupil(&session, &params, &mut out).is_err());
    }
}
