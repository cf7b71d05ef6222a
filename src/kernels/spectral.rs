use num_complex::Complex32;
use rayon::prelude::*;

use crate::compute::{expect_finite, expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;
use crate::spectrum::SPECTRUM;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralParams {
    pub width: usize,
    pub height: usize,
    /// Wavelength the PSF was computed at, in nm.
    pub reference_wavelength_nm: f32,
}

impl SpectralParams {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.reference_wavelength_nm.is_finite() && self.reference_wavelength_nm > 0.0 {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::SpectralBlur,
                reason: format!("reference wavelength {}", self.reference_wavelength_nm),
            })
        }
    }
}

/// Split the complex PSF into per-channel intensity PSFs.
///
/// `magnitude` receives the centered intensity `|psf|^2`. Each channel plane is
/// the sum over the spectrum table of the intensity rescaled about the center
/// by `lambda_ref / lambda`, weighted by the channel response, then normalized
/// to unit energy. Returns the peak intensity.
pub fn spectral_blur(
    session: &ComputeSession,
    psf: &[Complex32],
    magnitude: &mut [f32],
    planes: [&mut [f32]; 3],
    params: &SpectralParams,
) -> Result<f32, ComputeError> {
    params.validate()?;
    let (w, h) = (params.width, params.height);
    expect_len(Kernel::SpectralBlur, w * h, psf.len())?;
    expect_len(Kernel::SpectralBlur, w * h, magnitude.len())?;
    for plane in &planes {
        expect_len(Kernel::SpectralBlur, w * h, plane.len())?;
    }

    session.dispatch(Kernel::SpectralBlur, || {
        let (hx, hy) = (w / 2, h / 2);
        magnitude
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = (y + h - hy) % h;
                for (x, value) in row.iter_mut().enumerate() {
                    let sx = (x + w - hx) % w;
                    *value = psf[sy * w + sx].norm_sqr();
                }
            });

        let peak = magnitude.par_iter().cloned().reduce(|| 0.0, f32::max);
        let intensity: &[f32] = magnitude;
        let center = (hx as f32, hy as f32);

        for (channel, plane) in planes.into_iter().enumerate() {
            let samples: Vec<(f32, f32)> = SPECTRUM
                .iter()
                .filter(|s| s.weights[channel] > 0.0)
                .map(|s| (params.reference_wavelength_nm / s.wavelength_nm, s.weights[channel]))
                .collect();

            plane.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    *value = samples
                        .iter()
                        .map(|&(scale, weight)| {
                            let sx = center.0 + (x as f32 - center.0) * scale;
                            let sy = center.1 + (y as f32 - center.1) * scale;
                            weight * bilinear(intensity, w, h, sx, sy)
                        })
                        .sum();
                }
            });

            // sequential so a seeded frame reproduces bit for bit
            let energy = plane.iter().map(|&v| v as f64).sum::<f64>() as f32;
            if energy > 0.0 {
                plane.par_iter_mut().for_each(|v| *v /= energy);
            }
            expect_finite(Kernel::SpectralBlur, plane)?;
        }

        Ok(peak)
    })
}

/// Bilinear lookup at pixel coordinates; zero outside the plane.
fn bilinear(data: &[f32], w: usize, h: usize, x: f32, y: f32) -> f32 {
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return 0.0;
    }
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let top = data[y0 * w + x0] * (1.0 - fx) + data[y0 * w + x1] * fx;
    let bottom = data[y1 * w + x0] * (1.0 - fx) + data[y1 * w + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}
