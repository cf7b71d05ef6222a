//! The per-frame glare pipeline.
//!
//! A frame runs strictly in order: drain controls, perturb pupil and lens,
//! rasterize the aperture layers, propagate through the Fresnel kernel,
//! transform to the PSF, split it spectrally, convolve each channel with the
//! image and tone map. Any stage error drops the whole frame.

use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use num_complex::Complex32;

use crate::buffers::{BufferKey, Stage};
use crate::compute::ComputeSession;
use crate::config::GlareConfig;
use crate::controls::{control_queue, Control, ControlReceiver, ControlSender};
use crate::driver::{Frame, FrameSource};
use crate::error::{ComputeError, LoadError};
use crate::fft;
use crate::grating::GratingTexture;
use crate::kernels::{
    center_to_origin, convolve_spectra, generate_complex_exp, merge_images,
    multiply_with_complex_exp, real_part, render_gratings, render_lens_points, render_pupil,
    spectral_blur, FresnelParams, GratingParams, LensPointParams, MergeParams, PupilParams,
    SpectralParams,
};
use crate::optics::{fresnel_pitch_mm, OpticalModel, OpticalParameters};
use crate::particles::LensParticleField;
use crate::source::{Channel, OpticalImage};
use crate::tonemap::{tone_map, ToneMapSettings};

/// Resources tied to one loaded image. Shared read-only with in-flight frames.
#[derive(Debug)]
pub struct Scene {
    pub image: OpticalImage,
    pub grating: GratingTexture,
    pub particles: LensParticleField,
    /// Increments with every successful load.
    pub generation: u64,
}

struct FresnelCache {
    generation: u64,
    kernel: Arc<Vec<Complex32>>,
}

pub struct GlarePipeline {
    session: Arc<ComputeSession>,
    model: OpticalModel,
    particle_count: usize,
    scene: Option<Arc<Scene>>,
    fresnel: Option<FresnelCache>,
    controls: ControlReceiver,
    sender: ControlSender,
    generation: u64,
    frames: u64,
}

impl GlarePipeline {
    pub fn new(session: Arc<ComputeSession>, config: &GlareConfig) -> Self {
        let (sender, controls) = control_queue();
        Self {
            session,
            model: OpticalModel::new(&config.optics, &config.tonemap, config.render.seed),
            particle_count: config.optics.lens_particles,
            scene: None,
            fresnel: None,
            controls,
            sender,
            generation: 0,
            frames: 0,
        }
    }

    /// Handle for queueing parameter changes from another thread.
    pub fn controls(&self) -> ControlSender {
        self.sender.clone()
    }

    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.scene.clone()
    }

    pub fn params(&self) -> &OpticalParameters {
        self.model.params()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Load an EXR and a grating bitmap. On failure the current scene is kept.
    pub fn load_exr(&mut self, image: &Path, grating: &Path) -> Result<(), LoadError> {
        let result = OpticalImage::from_exr(&self.session, image).and_then(|image| {
            let texture = GratingTexture::load(grating, image.width() as u32, image.height() as u32)?;
            Ok((image, texture))
        });

        match result {
            Ok((image, texture)) => {
                self.install(image, texture);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %image.display(), error = %e, "Load rejected, keeping previous image");
                Err(e)
            }
        }
    }

    /// Install an already decoded image with a grating bitmap of any size.
    pub fn load_image(&mut self, image: OpticalImage, grating: RgbaImage) {
        let texture = GratingTexture::from_image(grating, image.width() as u32, image.height() as u32);
        self.install(image, texture);
    }

    fn install(&mut self, image: OpticalImage, grating: GratingTexture) {
        // Buffers of the previous size are useless now. In-flight frames hold
        // their own guards and an Arc of the old scene.
        self.session.release_buffers();

        let particles = LensParticleField::generate(self.particle_count, self.model.rng_mut());
        self.model
            .on_image_loaded(image.height(), image.stats().auto_exposure());
        self.generation += 1;

        tracing::info!(
            generation = self.generation,
            width = image.width(),
            height = image.height(),
            particles = particles.len(),
            auto_exposure = self.model.params().auto_exposure,
            "Scene installed"
        );

        self.scene = Some(Arc::new(Scene {
            image,
            grating,
            particles,
            generation: self.generation,
        }));
    }

    /// Apply all queued controls, last write wins.
    pub fn apply_controls(&mut self) {
        for control in self.controls.drain() {
            let params = self.model.params_mut();
            match control {
                Control::FieldLuminance(v) => params.field_luminance = v,
                Control::Gamma(v) => params.gamma = v,
                Control::WhitePoint(v) => params.white_point = v,
                Control::Alpha(v) => params.alpha = v,
                Control::ExposureMode(mode) => params.exposure_mode = mode,
                other => {
                    tracing::debug!(?other, "Control has no effect on glare");
                    continue;
                }
            }
            tracing::debug!(?control, "Control applied");
        }
    }

    fn fresnel_kernel(&mut self, scene: &Scene) -> Result<Arc<Vec<Complex32>>, ComputeError> {
        if let Some(cache) = self.fresnel.as_ref().filter(|c| c.generation == scene.generation) {
            return Ok(Arc::clone(&cache.kernel));
        }

        let params = self.model.params();
        let (width, height) = (scene.image.width(), scene.image.height());
        let kernel = Arc::new(generate_complex_exp(
            &self.session,
            &FresnelParams {
                width,
                height,
                wavelength_mm: params.wavelength_mm,
                distance_mm: params.distance_mm,
                pixel_pitch_mm: fresnel_pitch_mm(
                    params.max_pupil_mm,
                    params.wavelength_mm,
                    params.distance_mm,
                    width,
                    height,
                ),
            },
        )?);
        tracing::debug!(generation = scene.generation, "Fresnel kernel generated");

        self.fresnel = Some(FresnelCache {
            generation: scene.generation,
            kernel: Arc::clone(&kernel),
        });
        Ok(kernel)
    }

    /// Run one full frame. `Ok(None)` when no image is loaded.
    pub fn render_frame(&mut self) -> Result<Option<Frame>, ComputeError> {
        self.apply_controls();
        let Some(scene) = self.scene.clone() else {
            return Ok(None);
        };
        let (w, h) = (scene.image.width(), scene.image.height());

        self.model.update_pupil_diameter(h);
        self.model.update_lens_deformation();
        let fresnel = self.fresnel_kernel(&scene)?;
        let params = self.model.params().clone();

        let session = Arc::clone(&self.session);
        let session = &*session;
        let key = |stage| BufferKey::new(w, h, stage);
        let center = (w as f32 / 2.0, h as f32 / 2.0);

        let mut pupil = session.rgba.acquire(key(Stage::Pupil), w * h * 4);
        render_pupil(
            session,
            &PupilParams {
                width: w,
                height: h,
                radius_px: params.pupil_radius_px,
                center,
            },
            &mut pupil,
        )?;

        let mut grating = session.rgba.acquire(key(Stage::Grating), w * h * 4);
        render_gratings(
            session,
            &scene.grating,
            &GratingParams {
                width: w,
                height: h,
                radius_px: params.grating_radius_px,
                deformed_radius_px: params.deformed_grating_radius_px,
                center,
            },
            &mut grating,
        )?;

        let mut points = session.rgba.acquire(key(Stage::LensPoints), w * h * 4);
        render_lens_points(
            session,
            &scene.particles,
            &LensPointParams {
                width: w,
                height: h,
                lens_radius_px: params.grating_radius_px,
                distortion: params.lens_distortion,
                center,
            },
            &mut points,
        )?;

        let mut aperture = session.rgba.acquire(key(Stage::Merge), w * h * 4);
        merge_images(
            session,
            &grating,
            &pupil,
            &points,
            &MergeParams::new(w, h),
            &mut aperture,
        )?;
        drop((pupil, grating, points));

        let mut psf = session.complex.acquire(key(Stage::ComplexAperture), w * h);
        multiply_with_complex_exp(session, &aperture, &fresnel, &mut psf)?;
        fft::fft2d(session, &mut psf, w, h, false)?;

        let mut magnitude = session.real.acquire(key(Stage::Magnitude), w * h);
        let mut red = session.real.acquire(key(Stage::SpectralPsf(Channel::Red)), w * h);
        let mut green = session.real.acquire(key(Stage::SpectralPsf(Channel::Green)), w * h);
        let mut blue = session.real.acquire(key(Stage::SpectralPsf(Channel::Blue)), w * h);
        let psf_max = spectral_blur(
            session,
            &psf,
            &mut magnitude,
            [&mut red[..], &mut green[..], &mut blue[..]],
            &SpectralParams {
                width: w,
                height: h,
                reference_wavelength_nm: params.wavelength_mm * 1e6,
            },
        )?;

        let spectral = [&red[..], &green[..], &blue[..]];
        let mut convolved = Vec::with_capacity(3);
        for channel in Channel::ALL {
            let mut spectrum = session.complex.acquire(key(Stage::PsfSpectrum(channel)), w * h);
            center_to_origin(session, spectral[channel.index()], w, h, &mut spectrum)?;
            fft::fft2d(session, &mut spectrum, w, h, false)?;
            convolve_spectra(session, &mut spectrum, scene.image.spectrum(channel))?;
            fft::fft2d(session, &mut spectrum, w, h, true)?;

            let mut plane = session.real.acquire(key(Stage::Convolved(channel)), w * h);
            real_part(session, &spectrum, &mut plane)?;
            convolved.push(plane);
        }

        let settings = ToneMapSettings {
            exposure: params.exposure(),
            gamma: params.gamma,
            white_point: params.white_point,
        };
        let image = tone_map(
            session,
            [&convolved[0][..], &convolved[1][..], &convolved[2][..]],
            w,
            h,
            &settings,
        )?;

        let index = self.frames;
        self.frames += 1;
        tracing::info!(
            index,
            generation = scene.generation,
            pupil_mm = params.aperture_mm,
            distortion = params.lens_distortion,
            psf_max,
            exposure = settings.exposure,
            "Frame rendered"
        );

        Ok(Some(Frame {
            image,
            index,
            generation: scene.generation,
            psf_max: Some(psf_max),
            exposure: Some(settings.exposure),
        }))
    }
}

impl FrameSource for GlarePipeline {
    fn render_frame(&mut self) -> Result<Option<Frame>, ComputeError> {
        GlarePipeline::render_frame(self)
    }
}
