use glam::Vec3;
use image::RgbaImage;
use rayon::prelude::*;

use crate::compute::{expect_len, ComputeSession, Kernel};
use crate::error::ComputeError;

use super::camera_array::LightField;
use super::virtual_camera::CameraView;

/// Blend the selected array views into one virtual RGBA8 view.
///
/// Each output pixel is mapped through every view's homography and sampled
/// bilinearly; samples that land outside a view are skipped. Pixels no view
/// covers come out black.
pub fn lf_render(
    session: &ComputeSession,
    field: &LightField,
    views: &[CameraView],
    out: &mut [u8],
) -> Result<(), ComputeError> {
    let (w, h) = (field.width() as usize, field.height() as usize);
    expect_len(Kernel::LightFieldRender, w * h * 4, out.len())?;
    for view in views {
        if view.index >= field.array().len() || !view.homography.is_finite() {
            return Err(ComputeError::InvalidArgument {
                kernel: Kernel::LightFieldRender,
                reason: format!("bad view {view:?}"),
            });
        }
    }

    session.dispatch(Kernel::LightFieldRender, || {
        out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let target = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 1.0);
                let mut sum = [0.0f32; 3];
                let mut hits = 0u32;

                for view in views {
                    let p = view.homography * target;
                    if p.z.abs() < f32::EPSILON {
                        continue;
                    }
                    if let Some(rgb) = sample(field.view(view.index), p.x / p.z - 0.5, p.y / p.z - 0.5) {
                        sum.iter_mut().zip(rgb).for_each(|(s, v)| *s += v);
                        hits += 1;
                    }
                }

                if hits == 0 {
                    px.copy_from_slice(&[0, 0, 0, 255]);
                } else {
                    let n = hits as f32;
                    for (dst, s) in px.iter_mut().zip(sum) {
                        *dst = (s / n).round().clamp(0.0, 255.0) as u8;
                    }
                    px[3] = 255;
                }
            }
        });
        Ok(())
    })
}

/// Bilinear RGB sample at texel coordinates, `None` outside the image.
fn sample(image: &RgbaImage, x: f32, y: f32) -> Option<[f32; 3]> {
    let (w, h) = image.dimensions();
    let (max_x, max_y) = ((w - 1) as f32, (h - 1) as f32);
    if !(-0.5..=max_x + 0.5).contains(&x) || !(-0.5..=max_y + 0.5).contains(&y) {
        return None;
    }
    let (x, y) = (x.clamp(0.0, max_x), y.clamp(0.0, max_y));
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let texel = |x, y| image.get_pixel(x, y).0;
    let (a, b, c, d) = (texel(x0, y0), texel(x1, y0), texel(x0, y1), texel(x1, y1));
    let mut rgb = [0.0; 3];
    for (i, value) in rgb.iter_mut().enumerate() {
        let top = a[i] as f32 * (1.0 - fx) + b[i] as f32 * fx;
        let bottom = c[i] as f32 * (1.0 - fx) + d[i] as f32 * fx;
        *value = top * (1.0 - fy) + bottom * fy;
    }
    Some(rgb)
}
