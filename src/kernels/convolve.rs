use num_complex::Complex32;
use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

/// Move a centered real PSF back to origin layout as a complex plane,
/// ready for a forward transform.
pub fn center_to_origin(
    session: &ComputeSession,
    centered: &[f32],
    width: usize,
    height: usize,
    out: &mut [Complex32],
) -> Result<(), ComputeError> {
    expect_len(Kernel::Convolve, width * height, centered.len())?;
    expect_len(Kernel::Convolve, width * height, out.len())?;

    session.dispatch(Kernel::Convolve, || {
        let (hx, hy) = (width / 2, height / 2);
        out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let sy = (y + hy) % height;
            for (x, value) in row.iter_mut().enumerate() {
                let sx = (x + hx) % width;
                *value = Complex32::new(centered[sy * width + sx], 0.0);
            }
        });
        Ok(())
    })
}

/// Pointwise product of two spectra, written into `psf_spectrum`.
pub fn convolve_spectra(
    session: &ComputeSession,
    psf_spectrum: &mut [Complex32],
    image_spectrum: &[Complex32],
) -> Result<(), ComputeError> {
    expect_len(Kernel::Convolve, image_spectrum.len(), psf_spectrum.len())?;

    session.dispatch(Kernel::Convolve, || {
        psf_spectrum
            .par_iter_mut()
            .zip(image_spectrum.par_iter())
            .for_each(|(p, i)| *p *= *i);
        Ok(())
    })
}

/// Real parts of a complex plane.
pub fn real_part(
    session: &ComputeSession,
    data: &[Complex32],
    out: &mut [f32],
) -> Result<(), ComputeError> {
    expect_len(Kernel::Convolve, data.len(), out.len())?;

    session.dispatch(Kernel::Convolve, || {
        out.par_iter_mut()
            .zip(data.par_iter())
            .for_each(|(o, c)| *o = c.re);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::{fft2d, forward_real};
    use crate::kernels::tests::session;

    #[test]
    fn centered_delta_convolution_is_identity() {
        let session = session();
        let (w, h) = (6, 5);
        let image: Vec<f32> = (0..w * h).map(|i| i as f32).collect();
        let mut psf = vec![0.0; w * h];
        psf[(h / 2) * w + w / 2] = 1.0;

        let image_spectrum = forward_real(&session, &image, w, h).unwrap();
        let mut psf_spectrum = vec![Complex32::default(); w * h];
        center_to_origin(&session, &psf, w, h, &mut psf_spectrum).unwrap();
        assert_eq!(psf_spectrum[0], Complex32::new(1.0, 0.0));

        fft2d(&session, &mut psf_spectrum, w, h, false).unwrap();
        convolve_spectra(&session, &mut psf_spectrum, &image_spectrum).unwrap();
        fft2d(&session, &mut psf_spectrum, w, h, true).unwrap();

        let mut out = vec![0.0; w * h];
        real_part(&session, &psf_spectrum, &mut out).unwrap();
        for (a, b) in out.iter().zip(&image) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn uniform_psf_preserves_energy() {
        let session = session();
        let (w, h) = (4, 4);
        let image = vec![2.0; w * h];
        let psf = vec![1.0 / 16.0; w * h];

        let image_spectrum = forward_real(&session, &image, w, h).unwrap();
        let mut spectrum = vec![Complex32::default(); w * h];
        center_to_origin(&session, &psf, w, h, &mut spectrum).unwrap();
        fft2d(&session, &mut spectrum, w, h, false).unwrap();
        convolve_spectra(&session, &mut spectrum, &image_spectrum).unwrap();
        fft2d(&session, &mut spectrum, w, h, true).unwrap();

        let mut out = vec![0.0; w * h];
        real_part(&session, &spectrum, &mut out).unwrap();
        let total: f32 = out.iter().sum();
        assert!((total - 32.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_spectra_are_rejected() {
        let session = session();
        let mut a = vec![Complex32::default(); 4];
        let b = vec![Complex32::default(); 5];
        assert!(convolve_spectra(&session, &mut a, &b).is_err());
    }
}
