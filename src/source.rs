//! HDR source image: three linear radiance planes, their spectra and luminance statistics.

use std::path::Path;

use exr::image::FlatSamples;
use num_complex::Complex32;
use rayon::prelude::*;

use crate::compute::ComputeSession;
use crate::error::LoadError;
use crate::fft;

/// Offset added before taking the log of luminance.
const LOG_DELTA: f32 = 1e-4;

/// Rec. 709 luminance weights.
const LUMA_WEIGHTS: [f32; 3] = [0.212671, 0.715160, 0.072169];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// EXR channel name.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Red => "R",
            Channel::Green => "G",
            Channel::Blue => "B",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Scalar statistics gathered once at load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    pub min_luminance: f32,
    pub max_luminance: f32,
    pub average_luminance: f32,
    pub log_average_luminance: f32,
    /// Krawczyk et al. key value for automatic exposure.
    pub auto_key_value: f32,
    pub average_intensity: [f32; 3],
}

#[derive(Clone, Copy)]
struct StatsAccumulator {
    sum: [f64; 3],
    luminance: f64,
    log_luminance: f64,
    min: f32,
    max: f32,
}

impl StatsAccumulator {
    const EMPTY: Self = Self {
        sum: [0.0; 3],
        luminance: 0.0,
        log_luminance: 0.0,
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    fn push(mut self, rgb: [f32; 3]) -> Self {
        let lum = luminance(rgb);
        for (acc, v) in self.sum.iter_mut().zip(rgb) {
            *acc += v as f64;
        }
        self.luminance += lum as f64;
        self.log_luminance += ((LOG_DELTA + lum).max(f32::MIN_POSITIVE) as f64).ln();
        self.min = self.min.min(lum);
        self.max = self.max.max(lum);
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.sum.iter_mut().zip(other.sum) {
            *a += b;
        }
        self.luminance += other.luminance;
        self.log_luminance += other.log_luminance;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self
    }
}

pub fn luminance(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_WEIGHTS[0] + rgb[1] * LUMA_WEIGHTS[1] + rgb[2] * LUMA_WEIGHTS[2]
}

impl ImageStats {
    pub fn compute(red: &[f32], green: &[f32], blue: &[f32]) -> Self {
        let count = red.len().max(1) as f64;
        let acc = (red, green, blue)
            .into_par_iter()
            .fold(
                || StatsAccumulator::EMPTY,
                |acc, (&r, &g, &b)| acc.push([r, g, b]),
            )
            .reduce(|| StatsAccumulator::EMPTY, StatsAccumulator::merge);

        let log_average_luminance = (acc.log_luminance / count).exp() as f32;
        let auto_key_value = 1.03 - 2.0 / (2.0 + (log_average_luminance + 1.0).log10());

        Self {
            min_luminance: acc.min,
            max_luminance: acc.max,
            average_luminance: (acc.luminance / count) as f32,
            log_average_luminance,
            auto_key_value,
            average_intensity: acc.sum.map(|s| (s / count) as f32),
        }
    }

    /// Exposure that maps the log-average luminance to the key value.
    pub fn auto_exposure(&self) -> f32 {
        self.auto_key_value / self.log_average_luminance.max(f32::EPSILON)
    }
}

/// Immutable HDR image with precomputed per-channel spectra.
pub struct OpticalImage {
    width: usize,
    height: usize,
    planes: [Vec<f32>; 3],
    spectra: [Vec<Complex32>; 3],
    stats: ImageStats,
}

impl std::fmt::Debug for OpticalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpticalImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl OpticalImage {
    /// Build from red, green and blue planes, computing statistics and spectra.
    pub fn from_planes(
        session: &ComputeSession,
        width: usize,
        height: usize,
        planes: [Vec<f32>; 3],
    ) -> Result<Self, LoadError> {
        if width == 0 || height == 0 {
            return Err(LoadError::Empty { width, height });
        }
        for channel in Channel::ALL {
            let actual = planes[channel.index()].len();
            if actual != width * height {
                return Err(LoadError::PlaneSize {
                    channel: channel.name(),
                    expected: width * height,
                    actual,
                });
            }
        }

        let stats = ImageStats::compute(&planes[0], &planes[1], &planes[2]);
        let spectra = [
            fft::forward_real(session, &planes[0], width, height)?,
            fft::forward_real(session, &planes[1], width, height)?,
            fft::forward_real(session, &planes[2], width, height)?,
        ];

        tracing::info!(
            width,
            height,
            log_average = stats.log_average_luminance,
            key = stats.auto_key_value,
            "Image loaded"
        );

        Ok(Self {
            width,
            height,
            planes,
            spectra,
            stats,
        })
    }

    /// Read an OpenEXR file. Half, float and uint channels are accepted.
    pub fn from_exr(session: &ComputeSession, path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let image = exr::prelude::read_all_flat_layers_from_file(path).map_err(|source| {
            LoadError::Exr {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let layer = image
            .layer_data
            .first()
            .ok_or(LoadError::Empty { width: 0, height: 0 })?;
        let (width, height) = (layer.size.width(), layer.size.height());

        let channels = layer
            .channel_data
            .list
            .iter()
            .map(|channel| (channel.name.to_string(), samples_to_f32(&channel.sample_data)))
            .collect();

        let planes = select_rgb(channels)?;
        Self::from_planes(session, width, height, planes)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn plane(&self, channel: Channel) -> &[f32] {
        &self.planes[channel.index()]
    }

    pub fn spectrum(&self, channel: Channel) -> &[Complex32] {
        &self.spectra[channel.index()]
    }

    pub fn stats(&self) -> &ImageStats {
        &self.stats
    }
}

fn samples_to_f32(samples: &FlatSamples) -> Vec<f32> {
    match samples {
        FlatSamples::F16(values) => values.iter().map(|v| v.to_f32()).collect(),
        FlatSamples::F32(values) => values.clone(),
        FlatSamples::U32(values) => values.iter().map(|&v| v as f32).collect(),
    }
}

/// Pick the `R`, `G` and `B` planes; a lone channel is broadcast to all three.
fn select_rgb(mut channels: Vec<(String, Vec<f32>)>) -> Result<[Vec<f32>; 3], LoadError> {
    if channels.len() == 1 {
        let (_, plane) = channels.remove(0);
        return Ok([plane.clone(), plane.clone(), plane]);
    }

    let mut take = |channel: Channel| {
        channels
            .iter()
            .position(|(name, _)| name == channel.name())
            .map(|idx| std::mem::take(&mut channels[idx].1))
            .ok_or(LoadError::MissingChannel(channel.name()))
    };

    Ok([take(Channel::Red)?, take(Channel::Green)?, take(Channel::Blue)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeOptions;

    fn session() -> ComputeSession {
        ComputeSession::new(&ComputeOptions {
            threads: Some(2),
            skip_self_check: true,
        })
        .unwrap()
    }

    #[test]
    fn stats_of_uniform_image() {
        let plane = vec![2.0; 16];
        let stats = ImageStats::compute(&plane, &plane, &plane);
        let lum = luminance([2.0; 3]);
        assert!((stats.average_luminance - lum).abs() < 1e-5);
        assert!((stats.min_luminance - lum).abs() < 1e-6);
        assert!((stats.max_luminance - lum).abs() < 1e-6);
        assert!((stats.log_average_luminance - (lum + LOG_DELTA)).abs() < 1e-4);
        assert_eq!(stats.average_intensity, [2.0; 3]);
    }

    #[test]
    fn auto_exposure_matches_key_over_log_average() {
        let red: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
        let stats = ImageStats::compute(&red, &red, &red);
        let expected = stats.auto_key_value / stats.log_average_luminance;
        assert!((stats.auto_exposure() - expected).abs() < 1e-6);
    }

    #[test]
    fn black_image_keeps_finite_auto_exposure() {
        let zeros = vec![0.0; 9];
        let stats = ImageStats::compute(&zeros, &zeros, &zeros);
        assert!(stats.auto_exposure().is_finite());
    }

    #[test]
    fn single_channel_is_broadcast() {
        let planes = select_rgb(vec![("Y".to_string(), vec![1.0, 2.0])]).unwrap();
        assert_eq!(planes[0], vec![1.0, 2.0]);
        assert_eq!(planes[1], planes[2]);
    }

    #[test]
    fn channels_are_matched_by_name() {
        let planes = select_rgb(vec![
            ("B".to_string(), vec![3.0]),
            ("A".to_string(), vec![9.0]),
            ("G".to_string(), vec![2.0]),
            ("R".to_string(), vec![1.0]),
        ])
        .unwrap();
        assert_eq!(planes, [vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn missing_channel_is_an_error() {
        let err = select_rgb(vec![("R".to_string(), vec![1.0]), ("G".to_string(), vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingChannel("B")));
    }

    #[test]
    fn spectrum_dc_term_is_plane_sum() {
        let session = session();
        let plane: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let image =
            OpticalImage::from_planes(&session, 4, 4, [plane.clone(), plane.clone(), plane])
                .unwrap();
        let dc = image.spectrum(Channel::Green)[0];
        assert!((dc.re - 120.0).abs() < 1e-3);
        assert!(dc.im.abs() < 1e-3);
    }

    #[test]
    fn mismatched_plane_is_rejected() {
        let session = session();
        let err = OpticalImage::from_planes(&session, 2, 2, [vec![0.0; 4], vec![0.0; 3], vec![0.0; 4]])
            .unwrap_err();
        assert!(matches!(err, LoadError::PlaneSize { channel: "G", .. }));
    }

    #[test]
    fn exr_file_round_trips_through_loader() {
        let session = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.exr");
        exr::prelude::write_rgb_file(&path, 4, 2, |x, y| (x as f32, y as f32, 0.5)).unwrap();

        let image = OpticalImage::from_exr(&session, &path).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
        assert_eq!(image.plane(Channel::Red)[3], 3.0);
        assert_eq!(image.plane(Channel::Green)[4], 1.0);
        assert_eq!(image.plane(Channel::Blue)[0], 0.5);
    }

    #[test]
    fn unreadable_exr_is_a_load_error() {
        let session = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.exr");
        std::fs::write(&path, b"not an exr").unwrap();
        assert!(matches!(
            OpticalImage::from_exr(&session, &path),
            Err(LoadError::Exr { .. })
        ));
    }
}
