use num_complex::Complex32;
use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

/// Geometry of the free-space propagation term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FresnelParams {
    pub width: usize,
    pub height: usize,
    pub wavelength_mm: f32,
    pub distance_mm: f32,
    /// Size of one pixel on the lens plane, in mm.
    pub pixel_pitch_mm: f32,
}

impl FresnelParams {
    pub fn validate(&self) -> Result<(), ComputeError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if positive(self.wavelength_mm) && positive(self.distance_mm) && positive(self.pixel_pitch_mm) {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::GenerateComplexExp,
                reason: format!("{self:?}"),
            })
        }
    }
}

/// `exp(i * pi * (x^2 + y^2) / (lambda * z))` over the lens plane.
///
/// The phase is evaluated in f64.
pub fn generate_complex_exp(
    session: &ComputeSession,
    params: &FresnelParams,
) -> Result<Vec<Complex32>, ComputeError> {
    params.validate()?;

    session.dispatch(Kernel::GenerateComplexExp, || {
        let (cx, cy) = (params.width as f64 / 2.0, params.height as f64 / 2.0);
        let pitch = params.pixel_pitch_mm as f64;
        let k = std::f64::consts::PI / (params.wavelength_mm as f64 * params.distance_mm as f64);

        let mut field = vec![Complex32::default(); params.width * params.height];
        field
            .par_chunks_mut(params.width)
            .enumerate()
            .for_each(|(y, row)| {
                let yy = (y as f64 + 0.5 - cy) * pitch;
                for (x, value) in row.iter_mut().enumerate() {
                    let xx = (x as f64 + 0.5 - cx) * pitch;
                    let (sin, cos) = (k * (xx * xx + yy * yy)).sin_cos();
                    *value = Complex32::new(cos as f32, sin as f32);
                }
            });
        Ok(field)
    })
}

/// Aperture amplitude (first channel of `aperture`) times the Fresnel term.
pub fn multiply_with_complex_exp(
    session: &ComputeSession,
    aperture: &[u8],
    kernel: &[Complex32],
    out: &mut [Complex32],
) -> Result<(), ComputeError> {
    expect_len(Kernel::MultiplyComplexExp, kernel.len() * 4, aperture.len())?;
    expect_len(Kernel::MultiplyComplexExp, kernel.len(), out.len())?;

    session.dispatch(Kernel::MultiplyComplexExp, || {
        out.par_iter_mut()
            .zip(aperture.par_chunks(4))
            .zip(kernel.par_iter())
            .for_each(|((o, a), e)| *o = *e * (a[0] as f32 / 255.0));

        if out.par_iter().all(|c| c.re.is_finite() && c.im.is_finite()) {
            Ok(())
        } else {
            Err(ComputeError::NonFinite {
                kernel: Kernel::MultiplyComplexExp,
            })
        }
    })
}
