//! Error types, split by how far a failure is allowed to reach.

use std::path::PathBuf;

use crate::compute::Kernel;

/// Failures while bringing up the compute session. These are fatal.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The worker pool backing the compute session could not be created.
    #[error("failed to build compute thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A kernel failed its startup self-check.
    #[error("kernel `{kernel}` failed its startup check: {source}")]
    KernelCheck {
        kernel: Kernel,
        #[source]
        source: ComputeError,
    },
}

/// Failures while loading an image or texture. The previous scene stays active.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The EXR file could not be read or parsed.
    #[error("failed to read EXR `{path}`: {source}")]
    Exr {
        path: PathBuf,
        #[source]
        source: exr::error::Error,
    },

    /// A multi-channel EXR is missing one of the R/G/B channels.
    #[error("EXR is missing channel `{0}`")]
    MissingChannel(&'static str),

    /// The image has no pixels.
    #[error("image has zero size ({width}x{height})")]
    Empty { width: usize, height: usize },

    /// A channel plane does not hold `width * height` samples.
    #[error("channel `{channel}` holds {actual} samples, expected {expected}")]
    PlaneSize {
        channel: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The grating texture could not be read or decoded.
    #[error("failed to load grating texture `{path}`: {source}")]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A light-field view could not be decoded.
    #[error("failed to load light-field view `{path}`: {source}")]
    View {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Light-field directory listing failed.
    #[error("failed to read light-field directory `{path}`: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The light-field directory does not hold `rows * cols` equally sized views.
    #[error("light field needs {expected} views of equal size, found {found}")]
    LightFieldLayout { expected: usize, found: usize },

    /// Frequency-domain precomputation failed.
    #[error("failed to precompute image spectra: {0}")]
    Spectrum(#[from] ComputeError),
}

/// Failures during a single frame. The frame is dropped and the session continues.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComputeError {
    /// A stage received parameters outside its contract.
    #[error("invalid argument for `{kernel}`: {reason}")]
    InvalidArgument { kernel: Kernel, reason: String },

    /// A stage received a buffer of the wrong size.
    #[error("`{kernel}` expected {expected} elements, got {actual}")]
    DimensionMismatch {
        kernel: Kernel,
        expected: usize,
        actual: usize,
    },

    /// A stage produced NaN or infinite values.
    #[error("`{kernel}` produced non-finite output")]
    NonFinite { kernel: Kernel },

    /// A stage panicked while running on the pool.
    #[error("`{kernel}` aborted: {message}")]
    Aborted { kernel: Kernel, message: String },
}

/// Failures while reading or writing the RON configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the config file to disk.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),
}

impl ComputeError {
    /// Kernel that reported the failure.
    pub fn kernel(&self) -> Kernel {
        match self {
            ComputeError::InvalidArgument { kernel, .. }
            | ComputeError::DimensionMismatch { kernel, .. }
            | ComputeError::NonFinite { kernel }
            | ComputeError::Aborted { kernel, .. } => *kernel,
        }
    }
}
