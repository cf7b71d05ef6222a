//! Lens particles: dust and fibre scatter points on the lens.

use rand::Rng;

use crate::optics::{deformation_coeff, EPSILON};

/// A scatter point in normalized `[-1, 1]` lens coordinates.
///
/// `dx`/`dy` is the direction the point drifts when the lens deforms, scaled by
/// the deformation law at the point's radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensParticle {
    pub x: f32,
    pub dx: f32,
    pub y: f32,
    pub dy: f32,
}

impl LensParticle {
    /// Build a particle from a position, deriving its deformation offset.
    pub fn at(x: f32, y: f32) -> Self {
        let radius = (x * x + y * y).sqrt();
        let magnitude = deformation_coeff(radius.min(1.0));
        let guarded = radius.max(EPSILON);
        Self {
            x,
            dx: x / guarded * magnitude,
            y,
            dy: y / guarded * magnitude,
        }
    }

    /// Position after deformation by `distortion` (`0` = rest).
    pub fn displaced(&self, distortion: f32) -> (f32, f32) {
        (self.x + self.dx * distortion, self.y + self.dy * distortion)
    }
}

/// Fixed set of particles, regenerated with every image load.
#[derive(Debug, Clone, PartialEq)]
pub struct LensParticleField {
    particles: Vec<LensParticle>,
}

impl LensParticleField {
    /// Scatter `count` particles with random magnitude and sign on each axis.
    pub fn generate<R: Rng>(count: usize, rng: &mut R) -> Self {
        let particles = (0..count)
            .map(|_| {
                let x = rng.random_range(0.0..=1.0f32) * random_sign(rng);
                let y = rng.random_range(0.0..=1.0f32) * random_sign(rng);
                LensParticle::at(x, y)
            })
            .collect();

        tracing::debug!(count, "Lens particles generated");
        Self { particles }
    }

    pub fn from_particles(particles: Vec<LensParticle>) -> Self {
        Self { particles }
    }

    pub fn particles(&self) -> &[LensParticle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

fn random_sign<R: Rng>(rng: &mut R) -> f32 {
    if rng.random::<bool>() {
        1.0
    } else {
        -1.0
    }
}
