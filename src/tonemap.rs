//! Extended Reinhard tone mapping of three radiance planes to RGBA8.

use image::RgbaImage;
use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;
use crate::optics::EPSILON;

/// Inputs of the tone-map stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMapSettings {
    pub exposure: f32,
    pub gamma: f32,
    pub white_point: f32,
}

impl ToneMapSettings {
    pub fn validate(&self) -> Result<(), ComputeError> {
        let finite = self.exposure.is_finite() && self.gamma.is_finite() && self.white_point.is_finite();
        if finite && self.exposure >= 0.0 {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::ToneMapReinhardExtended,
                reason: format!("{self:?}"),
            })
        }
    }
}

/// `L * (1 + L / Lwhite^2) / (1 + L)`, grouped so large `L` cannot overflow.
pub fn reinhard_extended(l: f32, white_point: f32) -> f32 {
    let white = white_point.max(EPSILON);
    l / (1.0 + l) * (1.0 + l / (white * white))
}

/// Map one linear value to an 8-bit display value.
pub fn map_value(radiance: f32, settings: &ToneMapSettings) -> u8 {
    let l = radiance * settings.exposure;
    if l.is_nan() || l <= 0.0 {
        return 0;
    }
    if l.is_infinite() {
        return 255;
    }
    let mapped = reinhard_extended(l, settings.white_point);
    let display = mapped.powf(1.0 / settings.gamma.max(EPSILON));
    (display * 255.0).clamp(0.0, 255.0) as u8
}

/// Tone map three planes into an opaque RGBA image.
pub fn tone_map(
    session: &ComputeSession,
    planes: [&[f32]; 3],
    width: usize,
    height: usize,
    settings: &ToneMapSettings,
) -> Result<RgbaImage, ComputeError> {
    settings.validate()?;
    for plane in planes {
        expect_len(Kernel::ToneMapReinhardExtended, width * height, plane.len())?;
    }

    let data = session.dispatch(Kernel::ToneMapReinhardExtended, || {
        let mut data = vec![0u8; width * height * 4];
        data.par_chunks_mut(4).enumerate().for_each(|(i, px)| {
            px[0] = map_value(planes[0][i], settings);
            px[1] = map_value(planes[1][i], settings);
            px[2] = map_value(planes[2][i], settings);
            px[3] = 255;
        });
        Ok(data)
    })?;

    RgbaImage::from_raw(width as u32, height as u32, data).ok_or(ComputeError::DimensionMismatch {
        kernel: Kernel::ToneMapReinhardExtended,
        expected: width * height * 4,
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeOptions;

    fn settings(exposure: f32) -> ToneMapSettings {
        ToneMapSettings {
            exposure,
            gamma: 2.2,
            white_point: 5.0,
        }
    }

    #[test]
    fn output_is_monotonic_in_radiance() {
        let s = settings(1.0);
        let mut previous = 0;
        for i in 0..2000 {
            let v = map_value(i as f32 * 0.05, &s);
            assert!(v >= previous);
            previous = v;
        }
        assert_eq!(map_value(0.0, &s), 0);
        assert_eq!(map_value(1e9, &s), 255);
    }

    #[test]
    fn white_point_saturates() {
        let s = settings(1.0);
        // at L = Lwhite the extended operator reaches exactly one
        assert!((reinhard_extended(5.0, 5.0) - 1.0).abs() < 1e-6);
        assert!(map_value(5.0, &s) >= 254);
    }

    #[test]
    fn degenerate_gamma_and_white_do_not_panic() {
        let s = ToneMapSettings {
            exposure: 1.0,
            gamma: 0.0,
            white_point: 0.0,
        };
        for v in [0.0, 0.5, 1.0, 100.0] {
            let _ = map_value(v, &s);
        }
        assert_eq!(map_value(f32::NAN, &settings(1.0)), 0);
    }

    #[test]
    fn exposure_scales_input_before_mapping() {
        let low = map_value(0.1, &settings(1.0));
        let high = map_value(0.1, &settings(4.0));
        assert!(high > low);
        assert_eq!(map_value(0.4, &settings(1.0)), high);
    }

    #[test]
    fn tone_map_builds_opaque_image() {
        let session = ComputeSession::new(&ComputeOptions {
            threads: Some(1),
            skip_self_check: true,
        })
        .unwrap();
        let r = vec![0.0f32, 1.0, 2.0, 1000.0];
        let g = vec![0.0f32; 4];
        let b = vec![-1.0f32; 4];
        let image = tone_map(&session, [&r[..], &g[..], &b[..]], 2, 2, &settings(1.0)).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        for px in image.pixels() {
            assert_eq!(px.0[3], 255);
            assert_eq!(px.0[2], 0);
        }
        assert_eq!(image.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn nan_exposure_is_rejected() {
        assert!(settings(f32::NAN).validate().is_err());
    }
}
