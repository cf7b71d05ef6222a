use std::path::Path;

use glam::Vec3;
use image::RgbaImage;

use crate::error::LoadError;

/// Grid of identical pinhole cameras on the plane `z = 0`, all looking down `+z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraArray {
    pub rows: usize,
    pub cols: usize,
    /// Distance between neighbouring cameras.
    pub spacing: f32,
    pub fov_deg: f32,
}

impl CameraArray {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of camera `index` (row-major, row 0 at the top), centered on the origin.
    pub fn position(&self, index: usize) -> Vec3 {
        let (row, col) = (index / self.cols.max(1), index % self.cols.max(1));
        let x = col as f32 - (self.cols as f32 - 1.0) / 2.0;
        let y = (self.rows as f32 - 1.0) / 2.0 - row as f32;
        Vec3::new(x * self.spacing, y * self.spacing, 0.0)
    }
}

/// One image per array camera, all the same size.
#[derive(Debug, Clone)]
pub struct LightField {
    array: CameraArray,
    width: u32,
    height: u32,
    views: Vec<RgbaImage>,
}

impl LightField {
    pub fn from_images(array: CameraArray, views: Vec<RgbaImage>) -> Result<Self, LoadError> {
        let Some(first) = views.first() else {
            return Err(LoadError::LightFieldLayout {
                expected: array.len(),
                found: 0,
            });
        };
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(LoadError::Empty {
                width: width as usize,
                height: height as usize,
            });
        }

        let matching = views.iter().filter(|v| v.dimensions() == (width, height)).count();
        if views.len() != array.len() || matching != views.len() {
            return Err(LoadError::LightFieldLayout {
                expected: array.len(),
                found: matching,
            });
        }

        Ok(Self {
            array,
            width,
            height,
            views,
        })
    }

    /// Load every file in `dir`, ordered by file name, as the array's views.
    pub fn load_dir(dir: &Path, array: CameraArray) -> Result<Self, LoadError> {
        let listing_error = |source| LoadError::Directory {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(listing_error)? {
            let path = entry.map_err(listing_error)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let views = paths
            .iter()
            .map(|path| {
                image::open(path)
                    .map(|image| image.to_rgba8())
                    .map_err(|source| LoadError::View {
                        path: path.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let field = Self::from_images(array, views)?;
        tracing::info!(
            dir = %dir.display(),
            rows = array.rows,
            cols = array.cols,
            width = field.width,
            height = field.height,
            "Light field loaded"
        );
        Ok(field)
    }

    pub fn array(&self) -> &CameraArray {
        &self.array
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self, index: usize) -> &RgbaImage {
        &self.views[index]
    }
}
