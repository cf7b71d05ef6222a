//! Virtual-camera reprojection over a camera-array light field.
//!
//! Independent of the glare pipeline: it shares only the compute session and
//! the frame driver.

mod camera_array;
mod render;
mod virtual_camera;

pub use camera_array::{CameraArray, LightField};
pub use render::lf_render;
pub use virtual_camera::{intrinsics, CameraView, VirtualCamera};

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::buffers::{BufferKey, Stage};
use crate::compute::{ComputeSession, Kernel};
use crate::controls::{control_queue, ControlReceiver, ControlSender};
use crate::driver::{Frame, FrameSource};
use crate::error::ComputeError;

/// Renders the virtual view of a light field, one frame per request.
pub struct LightFieldRenderer {
    session: Arc<ComputeSession>,
    field: Arc<LightField>,
    camera: VirtualCamera,
    controls: ControlReceiver,
    sender: ControlSender,
    frames: u64,
}

impl LightFieldRenderer {
    pub fn new(session: Arc<ComputeSession>, field: Arc<LightField>, camera: VirtualCamera) -> Self {
        let (sender, controls) = control_queue();
        Self {
            session,
            field,
            camera,
            controls,
            sender,
            frames: 0,
        }
    }

    pub fn controls(&self) -> ControlSender {
        self.sender.clone()
    }

    pub fn camera(&self) -> &VirtualCamera {
        &self.camera
    }

    pub fn render_frame(&mut self) -> Result<Option<Frame>, ComputeError> {
        for control in self.controls.drain() {
            if !self.camera.apply(control) {
                tracing::debug!(?control, "Control has no effect on the light field view");
            }
        }

        let (w, h) = (self.field.width(), self.field.height());
        let views = self.camera.views(self.field.array(), w, h)?;

        let session = &*self.session;
        let mut out = session.rgba.acquire(
            BufferKey::new(w as usize, h as usize, Stage::LightField),
            w as usize * h as usize * 4,
        );
        lf_render(session, &self.field, &views, &mut out)?;

        let image = RgbaImage::from_raw(w, h, out.to_vec()).ok_or(ComputeError::DimensionMismatch {
            kernel: Kernel::LightFieldRender,
            expected: w as usize * h as usize * 4,
            actual: out.len(),
        })?;

        let index = self.frames;
        self.frames += 1;
        tracing::info!(
            index,
            views = views.len(),
            focus = self.camera.focus,
            aperture = self.camera.aperture,
            "Light field frame rendered"
        );

        Ok(Some(Frame {
            image,
            index,
            generation: 1,
            psf_max: None,
            exposure: None,
        }))
    }
}

impl FrameSource for LightFieldRenderer {
    fn render_frame(&mut self) -> Result<Option<Frame>, ComputeError> {
        LightFieldRenderer::render_frame(self)
    }
}

/// Startup check of the light-field kernel on a two-camera probe.
pub(crate) fn probe(session: &ComputeSession, width: u32, height: u32) -> Result<(), ComputeError> {
    let array = CameraArray {
        rows: 1,
        cols: 2,
        spacing: 1.0,
        fov_deg: 60.0,
    };
    let views = vec![
        RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255])),
        RgbaImage::from_pixel(width, height, Rgba([0, 0, 255, 255])),
    ];
    let field = LightField::from_images(array, views).map_err(|e| ComputeError::InvalidArgument {
        kernel: Kernel::LightFieldRender,
        reason: e.to_string(),
    })?;

    let camera = VirtualCamera::new(100.0, 2.0, 60.0);
    let views = camera.views(&array, width, height)?;
    let mut out = vec![0u8; (width * height * 4) as usize];
    lf_render(session, &field, &views, &mut out)
}
