//! Wavelength to RGB lookup used to smear the PSF into colour fringes.
//!
//! The table holds `SPECTRUM_RESOLUTION` samples equally spaced over
//! 380-700 nm. Each channel's weights are normalized to sum to one.

use std::sync::LazyLock;

/// Number of wavelength samples in the lookup table.
pub const SPECTRUM_RESOLUTION: usize = 32;

const LAMBDA_START: f32 = 380.0;
const LAMBDA_END: f32 = 700.0;

/// Centre wavelength of sample `i`, in nm.
pub fn wavelength_nm(i: usize) -> f32 {
    LAMBDA_START + (i as f32 + 0.5) * (LAMBDA_END - LAMBDA_START) / SPECTRUM_RESOLUTION as f32
}

/// Approximate linear RGB for a wavelength (Bruton's piecewise fit).
pub fn wavelength_to_rgb(lambda: f32) -> [f32; 3] {
    let rgb = if (380.0..440.0).contains(&lambda) {
        [-(lambda - 440.0) / (440.0 - 380.0), 0.0, 1.0]
    } else if (440.0..490.0).contains(&lambda) {
        [0.0, (lambda - 440.0) / (490.0 - 440.0), 1.0]
    } else if (490.0..510.0).contains(&lambda) {
        [0.0, 1.0, -(lambda - 510.0) / (510.0 - 490.0)]
    } else if (510.0..580.0).contains(&lambda) {
        [(lambda - 510.0) / (580.0 - 510.0), 1.0, 0.0]
    } else if (580.0..645.0).contains(&lambda) {
        [1.0, -(lambda - 645.0) / (645.0 - 580.0), 0.0]
    } else if (645.0..=700.0).contains(&lambda) {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 0.0, 0.0]
    };

    // intensity falls off near the ends of the visible range
    let factor = if (380.0..420.0).contains(&lambda) {
        0.3 + 0.7 * (lambda - 380.0) / (420.0 - 380.0)
    } else if (420.0..645.0).contains(&lambda) {
        1.0
    } else if (645.0..=700.0).contains(&lambda) {
        0.3 + 0.7 * (700.0 - lambda) / (700.0 - 645.0)
    } else {
        0.0
    };

    rgb.map(|c| c * factor)
}

/// One table entry: wavelength and per-channel weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumSample {
    pub wavelength_nm: f32,
    pub weights: [f32; 3],
}

/// Normalized lookup table.
pub static SPECTRUM: LazyLock<[SpectrumSample; SPECTRUM_RESOLUTION]> = LazyLock::new(|| {
    let mut table = [SpectrumSample {
        wavelength_nm: 0.0,
        weights: [0.0; 3],
    }; SPECTRUM_RESOLUTION];

    let mut totals = [0.0f32; 3];
    for (i, sample) in table.iter_mut().enumerate() {
        let lambda = wavelength_nm(i);
        let weights = wavelength_to_rgb(lambda);
        for (total, w) in totals.iter_mut().zip(weights) {
            *total += w;
        }
        *sample = SpectrumSample {
            wavelength_nm: lambda,
            weights,
        };
    }

    for sample in table.iter_mut() {
        for (w, total) in sample.weights.iter_mut().zip(totals) {
            *w /= total.max(f32::EPSILON);
        }
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_weights_sum_to_one() {
        for c in 0..3 {
            let total: f32 = SPECTRUM.iter().map(|s| s.weights[c]).sum();
            assert!((total - 1.0).abs() < 1e-5, "channel {c} sums to {total}");
        }
    }

    #[test]
    fn samples_cover_visible_range_in_order() {
        assert!(SPECTRUM[0].wavelength_nm > LAMBDA_START);
        assert!(SPECTRUM[SPECTRUM_RESOLUTION - 1].wavelength_nm < LAMBDA_END);
        assert!(SPECTRUM.windows(2).all(|w| w[0].wavelength_nm < w[1].wavelength_nm));
    }

    #[test]
    fn red_dominates_long_wavelengths() {
        let [r, g, b] = wavelength_to_rgb(650.0);
        assert!(r > g && r > b);
        let [r, _, b] = wavelength_to_rgb(450.0);
        assert!(b > r);
    }
}
