//! Two-dimensional FFTs over row-major complex planes.
//!
//! Rows are transformed in place, then the plane is transposed so columns can
//! be transformed as contiguous rows, and transposed back. The inverse
//! transform is normalized by `1 / (width * height)`.

use num_complex::Complex32;
use rayon::prelude::*;

use crate::buffers::{BufferKey, Stage};
use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

/// In-place 2D transform of a `width x height` plane.
pub fn fft2d(
    session: &ComputeSession,
    data: &mut [Complex32],
    width: usize,
    height: usize,
    inverse: bool,
) -> Result<(), ComputeError> {
    expect_len(Kernel::Fft2d, width * height, data.len())?;
    if width == 0 || height == 0 {
        return Ok(());
    }

    let row_plan = session.fft_plan(width, inverse);
    let col_plan = session.fft_plan(height, inverse);
    let mut transposed = session
        .complex
        .acquire(BufferKey::new(width, height, Stage::Transpose), width * height);

    session.dispatch(Kernel::Fft2d, || {
        data.par_chunks_mut(width).for_each_init(
            || vec![Complex32::default(); row_plan.get_inplace_scratch_len()],
            |scratch, row| row_plan.process_with_scratch(row, scratch),
        );

        transpose(data, &mut transposed, width, height);

        transposed.par_chunks_mut(height).for_each_init(
            || vec![Complex32::default(); col_plan.get_inplace_scratch_len()],
            |scratch, col| col_plan.process_with_scratch(col, scratch),
        );

        transpose(&transposed, data, height, width);

        if inverse {
            let scale = 1.0 / (width * height) as f32;
            data.par_iter_mut().for_each(|v| *v *= scale);
        }
        Ok(())
    })
}

/// Forward transform of a real plane, returning a new complex spectrum.
pub fn forward_real(
    session: &ComputeSession,
    plane: &[f32],
    width: usize,
    height: usize,
) -> Result<Vec<Complex32>, ComputeError> {
    expect_len(Kernel::Fft2d, width * height, plane.len())?;
    let mut spectrum: Vec<Complex32> = plane.par_iter().map(|&v| Complex32::new(v, 0.0)).collect();
    fft2d(session, &mut spectrum, width, height, false)?;
    Ok(spectrum)
}

/// `output` (height of `input` rows) receives the transpose of `input` (`width x height`).
fn transpose(input: &[Complex32], output: &mut [Complex32], width: usize, height: usize) {
    output
        .par_chunks_mut(height)
        .enumerate()
        .for_each(|(x, column)| {
            for (y, value) in column.iter_mut().enumerate() {
                *value = input[y * width + x];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeOptions;
    use rand::{Rng, SeedableRng};

    fn session() -> ComputeSession {
        ComputeSession::new(&ComputeOptions {
            threads: Some(2),
            skip_self_check: true,
        })
        .unwrap()
    }

    fn max_error(a: &[Complex32], b: &[Complex32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f32::max)
    }

    #[test]
    fn impulse_transforms_to_constant() {
        let session = session();
        let (w, h) = (8, 4);
        let mut data = vec![Complex32::default(); w * h];
        data[0] = Complex32::new(1.0, 0.0);

        fft2d(&session, &mut data, w, h, false).unwrap();
        for v in &data {
            assert!((v.re - 1.0).abs() < 1e-6 && v.im.abs() < 1e-6);
        }
    }

    #[test]
    fn impulse_round_trip() {
        let session = session();
        let (w, h) = (16, 16);
        let mut original = vec![Complex32::default(); w * h];
        original[5 * w + 9] = Complex32::new(1.0, 0.0);

        let mut data = original.clone();
        fft2d(&session, &mut data, w, h, false).unwrap();
        fft2d(&session, &mut data, w, h, true).unwrap();
        assert!(max_error(&data, &original) < 1e-4);
    }

    #[test]
    fn random_field_round_trip_non_square() {
        let session = session();
        let (w, h) = (12, 20);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let original: Vec<Complex32> = (0..w * h)
            .map(|_| Complex32::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect();

        let mut data = original.clone();
        fft2d(&session, &mut data, w, h, false).unwrap();
        fft2d(&session, &mut data, w, h, true).unwrap();
        assert!(max_error(&data, &original) < 1e-4);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let session = session();
        let mut data = vec![Complex32::default(); 10];
        let err = fft2d(&session, &mut data, 4, 4, false).unwrap_err();
        assert!(matches!(err, ComputeError::DimensionMismatch { expected: 16, actual: 10, .. }));
    }
}
