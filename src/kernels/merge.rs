use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

/// How strongly each occluder layer blocks light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    pub width: usize,
    pub height: usize,
    pub grating_opacity: f32,
    pub particle_opacity: f32,
}

impl MergeParams {
    pub const DEFAULT_GRATING_OPACITY: f32 = 0.5;
    pub const DEFAULT_PARTICLE_OPACITY: f32 = 1.0;

    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            grating_opacity: Self::DEFAULT_GRATING_OPACITY,
            particle_opacity: Self::DEFAULT_PARTICLE_OPACITY,
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        let unit = 0.0..=1.0;
        if unit.contains(&self.grating_opacity) && unit.contains(&self.particle_opacity) {
            Ok(())
        } else {
            Err(ComputeError::InvalidArgument {
                kernel: Kernel::MergeImages,
                reason: format!(
                    "opacities {} / {} outside [0, 1]",
                    self.grating_opacity, self.particle_opacity
                ),
            })
        }
    }
}

/// Transmission of one texel: `pupil * (1 - kg * grating) * (1 - kp * particle)`.
pub fn merge_texel(pupil: u8, grating: u8, particle: u8, params: &MergeParams) -> u8 {
    let unit = |v: u8| v as f32 / 255.0;
    let t = unit(pupil)
        * (1.0 - params.grating_opacity * unit(grating))
        * (1.0 - params.particle_opacity * unit(particle));
    (t * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Combine pupil, grating and particle layers into one aperture transmission image.
pub fn merge_images(
    session: &ComputeSession,
    grating: &[u8],
    pupil: &[u8],
    particles: &[u8],
    params: &MergeParams,
    out: &mut [u8],
) -> Result<(), ComputeError> {
    params.validate()?;
    let len = params.width * params.height * 4;
    for layer in [grating, pupil, particles, &*out] {
        expect_len(Kernel::MergeImages, len, layer.len())?;
    }

    session.dispatch(Kernel::MergeImages, || {
        out.par_chunks_mut(4)
            .zip(grating.par_chunks(4))
            .zip(pupil.par_chunks(4))
            .zip(particles.par_chunks(4))
            .for_each(|(((o, g), p), d)| {
                let t = merge_texel(p[0], g[0], d[0], params);
                o.copy_from_slice(&[t, t, t, 255]);
            });
        Ok(())
    })
}
