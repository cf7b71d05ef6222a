//! Optical parameter model: pupil size, lens deformation and exposure state.
//!
//! Scalars here feed every geometry stage of a frame. Randomness comes from a
//! generator owned by the model so a fixed seed gives reproducible frames.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ExposureMode, OpticsConfig, ToneMapConfig};

/// Smallest value accepted where a log or a division would otherwise blow up.
pub const EPSILON: f32 = 1e-6;

/// Upper bound of [`OpticalModel::noise`].
pub const MAX_NOISE: f32 = 0.09;

/// Normalized deformation law: `(e^d - 1) / (e - 1)`.
///
/// Zero at the lens center, one at the pupil edge, convex in between.
pub fn deformation_coeff(d: f32) -> f32 {
    (d.exp() - 1.0) / (std::f32::consts::E - 1.0)
}

/// Pupil diameter (mm) for a given adaptation luminance, before noise.
pub fn base_pupil_diameter(field_luminance: f32) -> f32 {
    let luminance = field_luminance.max(EPSILON);
    4.9 - 3.0 * (0.4 * (luminance.ln() + 1.0)).tanh()
}

/// Size of the simulated lens plane in mm: the largest pupil plus a margin.
pub fn lens_plane_mm(max_pupil_mm: f32) -> f32 {
    max_pupil_mm + 2.0
}

/// Pupil radius in pixels for an aperture diameter, clamped to `(0, height / 2]`.
pub fn pupil_radius_px(aperture_mm: f32, max_pupil_mm: f32, image_height: usize) -> f32 {
    let half = image_height as f32 / 2.0;
    (half * aperture_mm / lens_plane_mm(max_pupil_mm)).clamp(EPSILON, half)
}

/// Lens-plane pixel pitch of the Fresnel term, in mm.
///
/// The geometric pitch `lens_plane / height` is capped at the critical pitch
/// `sqrt(lambda * z / n)`, at which the chirp reaches the Nyquist rate exactly
/// at the plane's edge. Any coarser pitch aliases the phase into noise.
pub fn fresnel_pitch_mm(
    max_pupil_mm: f32,
    wavelength_mm: f32,
    distance_mm: f32,
    width: usize,
    height: usize,
) -> f32 {
    let geometric = lens_plane_mm(max_pupil_mm) as f64 / height.max(1) as f64;
    let n = width.max(height).max(1) as f64;
    let critical = (wavelength_mm as f64 * distance_mm as f64 / n).sqrt();
    if critical.is_finite() && critical > 0.0 {
        geometric.min(critical) as f32
    } else {
        geometric as f32
    }
}

/// All scalars consumed by the pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalParameters {
    pub max_pupil_mm: f32,
    pub field_luminance: f32,
    /// Current pupil diameter in mm, including noise.
    pub aperture_mm: f32,
    pub pupil_radius_px: f32,
    /// Lens distortion magnitude in percent, `[0, 9]`.
    pub lens_distortion: f32,
    /// Grating radius at rest, in pixels.
    pub grating_radius_px: f32,
    /// Grating radius after this frame's deformation.
    pub deformed_grating_radius_px: f32,
    pub wavelength_mm: f32,
    pub distance_mm: f32,
    pub gamma: f32,
    pub white_point: f32,
    pub alpha: f32,
    pub exposure_mode: ExposureMode,
    pub auto_exposure: f32,
}

impl OpticalParameters {
    pub fn new(optics: &OpticsConfig, tonemap: &ToneMapConfig) -> Self {
        Self {
            max_pupil_mm: optics.max_pupil_mm,
            field_luminance: optics.field_luminance,
            aperture_mm: optics.max_pupil_mm,
            pupil_radius_px: 0.0,
            lens_distortion: 0.0,
            grating_radius_px: 0.0,
            deformed_grating_radius_px: 0.0,
            wavelength_mm: optics.wavelength_nm * 1e-6,
            distance_mm: optics.distance_mm,
            gamma: tonemap.gamma,
            white_point: tonemap.white_point,
            alpha: tonemap.alpha,
            exposure_mode: tonemap.exposure_mode,
            auto_exposure: 1.0,
        }
    }

    /// Exposure knob mapped exponentially: `2^((alpha - 0.5) * 20)`.
    ///
    /// Saturates to the finite positive `f32` range; the ends of the alpha
    /// slider overflow it.
    pub fn manual_exposure(&self) -> f32 {
        let exposure = 2f64.powf((self.alpha as f64 - 0.5) * 20.0);
        if exposure.is_nan() {
            return 1.0;
        }
        exposure.clamp(f32::MIN_POSITIVE as f64, f32::MAX as f64) as f32
    }

    /// Exposure used by the tone mapper for the current mode.
    pub fn exposure(&self) -> f32 {
        match self.exposure_mode {
            ExposureMode::Auto => self.auto_exposure,
            ExposureMode::Manual => self.manual_exposure(),
        }
    }
}

/// Owns the parameters and the random source that perturbs them.
pub struct OpticalModel {
    params: OpticalParameters,
    rng: StdRng,
}

impl OpticalModel {
    /// Model seeded from `seed`, or from the OS when `None`.
    pub fn new(optics: &OpticsConfig, tonemap: &ToneMapConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            params: OpticalParameters::new(optics, tonemap),
            rng,
        }
    }

    pub fn params(&self) -> &OpticalParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut OpticalParameters {
        &mut self.params
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Uniform noise in `[0, 0.09]`, in steps of 0.01.
    pub fn noise(&mut self) -> f32 {
        self.rng.random_range(0..=9) as f32 / 100.0
    }

    /// Reset per-image state: full aperture, fresh auto exposure and grating radius.
    pub fn on_image_loaded(&mut self, image_height: usize, auto_exposure: f32) {
        let p = &mut self.params;
        p.aperture_mm = p.max_pupil_mm;
        p.auto_exposure = auto_exposure;
        p.grating_radius_px = pupil_radius_px(p.max_pupil_mm, p.max_pupil_mm, image_height);
        p.deformed_grating_radius_px = p.grating_radius_px;
        p.pupil_radius_px = p.grating_radius_px;
    }

    /// Pupil light adaptation plus noise, converted to a pixel radius.
    pub fn update_pupil_diameter(&mut self, image_height: usize) {
        let noise = self.noise();
        let p = &mut self.params;
        let max = p.max_pupil_mm.max(EPSILON);
        let base = base_pupil_diameter(p.field_luminance);
        let spread = (1.0 - base / max).max(0.0).sqrt();

        p.aperture_mm = (base + noise * max / base * spread).min(max);
        p.pupil_radius_px = pupil_radius_px(p.aperture_mm, max, image_height);
    }

    /// Draw a new distortion magnitude and deform the grating radius with it.
    pub fn update_lens_deformation(&mut self) {
        let distortion = self.noise() * 100.0;
        let p = &mut self.params;
        p.lens_distortion = distortion;
        p.deformed_grating_radius_px =
            p.grating_radius_px * (1.0 + deformation_coeff(distortion / 100.0));
    }
}
