//! Compute kernels for each pipeline stage.
//!
//! Every kernel takes a named-field parameter struct, validates it, checks
//! buffer lengths and then runs through [`ComputeSession::dispatch`].

mod convolve;
mod fresnel;
mod gratings;
mod lens_points;
mod merge;
mod pupil;
mod spectral;

pub use convolve::{center_to_origin, convolve_spectra, real_part};
pub use fresnel::{generate_complex_exp, multiply_with_complex_exp, FresnelParams};
pub use gratings::{render_gratings, GratingParams};
pub use lens_points::{render_lens_points, LensPointParams};
pub use merge::{merge_images, merge_texel, MergeParams};
pub use pupil::{render_pupil, PupilParams};
pub use spectral::{spectral_blur, SpectralParams};

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::compute::{ComputeSession, Kernel};
use crate::error::{ComputeError, StartupError};
use crate::fft;
use crate::grating::GratingTexture;
use crate::particles::LensParticleField;
use crate::reprojection;
use crate::tonemap::{self, ToneMapSettings};

const PROBE_SIZE: usize = 8;

/// Run every kernel once on a tiny probe frame.
///
/// This is the startup gate: the first kernel that fails is reported by name.
pub(crate) fn self_check(session: &ComputeSession) -> Result<(), StartupError> {
    probe(session).map_err(|source| StartupError::KernelCheck {
        kernel: source.kernel(),
        source,
    })
}

fn probe(session: &ComputeSession) -> Result<(), ComputeError> {
    let (w, h) = (PROBE_SIZE, PROBE_SIZE);
    let center = (w as f32 / 2.0, h as f32 / 2.0);
    let rgba_len = w * h * 4;

    let mut pupil = vec![0u8; rgba_len];
    render_pupil(
        session,
        &PupilParams {
            width: w,
            height: h,
            radius_px: 3.0,
            center,
        },
        &mut pupil,
    )?;

    let texture = GratingTexture::radial(w as u32, h as u32, 4);
    let mut grating = vec![0u8; rgba_len];
    render_gratings(
        session,
        &texture,
        &GratingParams {
            width: w,
            height: h,
            radius_px: 3.0,
            deformed_radius_px: 3.5,
            center,
        },
        &mut grating,
    )?;

    let field = LensParticleField::generate(16, &mut StdRng::seed_from_u64(0));
    let mut particles = vec![0u8; rgba_len];
    render_lens_points(
        session,
        &field,
        &LensPointParams {
            width: w,
            height: h,
            lens_radius_px: 3.0,
            distortion: 5.0,
            center,
        },
        &mut particles,
    )?;

    let mut merged = vec![0u8; rgba_len];
    merge_images(session, &grating, &pupil, &particles, &MergeParams::new(w, h), &mut merged)?;

    let exp = generate_complex_exp(
        session,
        &FresnelParams {
            width: w,
            height: h,
            wavelength_mm: 575e-6,
            distance_mm: 20.0,
            pixel_pitch_mm: 0.1,
        },
    )?;
    let mut psf = vec![Complex32::default(); w * h];
    multiply_with_complex_exp(session, &merged, &exp, &mut psf)?;
    fft::fft2d(session, &mut psf, w, h, false)?;

    let mut magnitude = vec![0.0; w * h];
    let mut planes = [vec![0.0f32; w * h], vec![0.0; w * h], vec![0.0; w * h]];
    let [r, g, b] = &mut planes;
    spectral_blur(
        session,
        &psf,
        &mut magnitude,
        [&mut r[..], &mut g[..], &mut b[..]],
        &SpectralParams {
            width: w,
            height: h,
            reference_wavelength_nm: 575.0,
        },
    )?;

    let image_spectrum = fft::forward_real(session, &planes[1], w, h)?;
    let mut spectrum = vec![Complex32::default(); w * h];
    center_to_origin(session, &planes[0], w, h, &mut spectrum)?;
    fft::fft2d(session, &mut spectrum, w, h, false)?;
    convolve_spectra(session, &mut spectrum, &image_spectrum)?;
    fft::fft2d(session, &mut spectrum, w, h, true)?;
    let mut convolved = vec![0.0; w * h];
    real_part(session, &spectrum, &mut convolved)?;

    tonemap::tone_map(
        session,
        [&convolved[..], &convolved[..], &convolved[..]],
        w,
        h,
        &ToneMapSettings {
            exposure: 1.0,
            gamma: 2.2,
            white_point: 5.0,
        },
    )?;

    reprojection::probe(session, w as u32, h as u32)?;

    tracing::debug!(kernels = Kernel::ALL.len(), "Probe frame complete");
    Ok(())
}
