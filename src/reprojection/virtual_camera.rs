use glam::{Mat3, Vec3};

use crate::compute::Kernel;
use crate::controls::Control;
use crate::error::ComputeError;

use super::camera_array::CameraArray;

/// Pixel-to-pixel transform from the virtual view into one array camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub index: usize,
    pub homography: Mat3,
}

/// Widest field of view that still gives an invertible projection.
const MAX_PROJECTIVE_FOV_DEG: f32 = 179.0;

/// Pinhole intrinsics with the image y axis pointing down.
pub fn intrinsics(fov_deg: f32, width: u32, height: u32) -> Mat3 {
    let fov = fov_deg.min(MAX_PROJECTIVE_FOV_DEG).to_radians();
    let f = (width as f32 / 2.0) / (fov / 2.0).tan();
    Mat3::from_cols(
        Vec3::new(f, 0.0, 0.0),
        Vec3::new(0.0, -f, 0.0),
        Vec3::new(width as f32 / 2.0, height as f32 / 2.0, 1.0),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualCamera {
    pub position: Vec3,
    /// Depth of the in-focus plane.
    pub focus: f32,
    /// Radius around the virtual position within which array cameras contribute.
    pub aperture: f32,
    pub fov_deg: f32,
}

impl VirtualCamera {
    pub fn new(focus: f32, aperture: f32, fov_deg: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            focus,
            aperture,
            fov_deg,
        }
    }

    /// Apply a camera control; returns `false` for controls that are not ours.
    pub fn apply(&mut self, control: Control) -> bool {
        match control.clamped() {
            Control::Focus(v) => self.focus = v,
            Control::Aperture(v) => self.aperture = v,
            Control::Fov(v) => self.fov_deg = v,
            Control::CameraPosition(p) => self.position = p,
            _ => return false,
        }
        true
    }

    /// Homography taking virtual pixels to pixels of the camera at `camera`.
    ///
    /// A virtual pixel is unprojected to a ray, intersected with the focus
    /// plane `z = focus` and projected into the array camera.
    pub fn homography(&self, camera: Vec3, array_fov_deg: f32, width: u32, height: u32) -> Option<Mat3> {
        let depth = self.focus - self.position.z;
        if depth <= 0.0 || self.focus <= 0.0 {
            return None;
        }
        let scale = depth / self.focus;
        let offset = (self.position - camera) / self.focus;
        let through_focus = Mat3::from_cols(
            Vec3::new(scale, 0.0, 0.0),
            Vec3::new(0.0, scale, 0.0),
            Vec3::new(offset.x, offset.y, 1.0),
        );

        let h = intrinsics(array_fov_deg, width, height)
            * through_focus
            * intrinsics(self.fov_deg, width, height).inverse();
        h.is_finite().then_some(h)
    }

    /// Views of the cameras inside the aperture, or of the nearest camera if none is.
    pub fn views(&self, array: &CameraArray, width: u32, height: u32) -> Result<Vec<CameraView>, ComputeError> {
        let here = self.position.truncate();
        let distance = |i: usize| array.position(i).truncate().distance(here);

        let mut selected: Vec<usize> = (0..array.len()).filter(|&i| distance(i) <= self.aperture).collect();
        if selected.is_empty() {
            selected.extend((0..array.len()).min_by(|&a, &b| distance(a).total_cmp(&distance(b))));
        }

        selected
            .into_iter()
            .map(|index| {
                self.homography(array.position(index), array.fov_deg, width, height)
                    .map(|homography| CameraView { index, homography })
                    .ok_or_else(|| ComputeError::InvalidArgument {
                        kernel: Kernel::LightFieldRender,
                        reason: format!(
                            "virtual camera at z = {} cannot focus at {}",
                            self.position.z, self.focus
                        ),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(h: Mat3, u: f32, v: f32) -> (f32, f32) {
        let p = h * Vec3::new(u, v, 1.0);
        (p.x / p.z, p.y / p.z)
    }

    fn array() -> CameraArray {
        CameraArray {
            rows: 3,
            cols: 3,
            spacing: 10.0,
            fov_deg: 60.0,
        }
    }

    #[test]
    fn camera_at_array_position_is_identity() {
        let mut camera = VirtualCamera::new(200.0, 1.0, 60.0);
        camera.position = array().position(4);
        let h = camera.homography(array().position(4), 60.0, 64, 48).unwrap();
        let (u, v) = apply(h, 10.5, 33.5);
        assert!((u - 10.5).abs() < 1e-3 && (v - 33.5).abs() < 1e-3);
    }

    #[test]
    fn neighbour_camera_sees_a_parallax_shift() {
        let camera = VirtualCamera::new(100.0, 1.0, 60.0);
        // camera one spacing to the right: focus-plane points appear further left
        let h = camera.homography(Vec3::new(10.0, 0.0, 0.0), 60.0, 64, 64).unwrap();
        let (u, v) = apply(h, 32.0, 32.0);
        let f = 32.0 / (30f32.to_radians()).tan();
        assert!((u - (32.0 - f * 10.0 / 100.0)).abs() < 1e-2);
        assert!((v - 32.0).abs() < 1e-3);
    }

    #[test]
    fn camera_behind_focus_plane_has_no_homography() {
        let mut camera = VirtualCamera::new(50.0, 1.0, 60.0);
        camera.position.z = 60.0;
        assert!(camera.homography(Vec3::ZERO, 60.0, 8, 8).is_none());
        assert!(camera.views(&array(), 8, 8).is_err());
    }

    #[test]
    fn aperture_selects_cameras() {
        let mut camera = VirtualCamera::new(100.0, 10.0, 60.0);
        let views = camera.views(&array(), 8, 8).unwrap();
        let mut indices: Vec<_> = views.iter().map(|v| v.index).collect();
        indices.sort();
        assert_eq!(indices, vec![1, 3, 4, 5, 7]);

        camera.aperture = 1.0;
        camera.position = Vec3::new(-9.0, 8.0, 0.0);
        let views = camera.views(&array(), 8, 8).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].index, 0);
    }

    #[test]
    fn controls_are_clamped_and_filtered() {
        let mut camera = VirtualCamera::new(100.0, 10.0, 60.0);
        assert!(camera.apply(Control::Fov(400.0)));
        assert_eq!(camera.fov_deg, 180.0);
        assert!(camera.apply(Control::Focus(20000.0)));
        assert_eq!(camera.focus, 15000.0);
        assert!(!camera.apply(Control::Gamma(2.0)));
    }
}
