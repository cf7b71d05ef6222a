//! Temporal glare simulation over HDR images.
//!
//! An [`OpticalImage`] is loaded once with its spectra precomputed. Each frame
//! the [`GlarePipeline`] perturbs the pupil and lens, diffracts the resulting
//! aperture into a point-spread function, disperses it across wavelengths,
//! convolves it with the image and tone maps the result.

pub mod buffers;
pub mod compute;
pub mod config;
pub mod controls;
pub mod driver;
pub mod error;
pub mod fft;
pub mod grating;
pub mod kernels;
pub mod logging;
pub mod optics;
pub mod particles;
pub mod pipeline;
pub mod reprojection;
pub mod source;
pub mod spectrum;
pub mod tonemap;

pub use compute::{ComputeOptions, ComputeSession, Kernel};
pub use config::GlareConfig;
pub use controls::{Control, ControlSender};
pub use driver::{BackgroundDriver, Frame, FrameDriver, FrameSource, MemorySurface, RenderSurface};
pub use error::{ComputeError, ConfigError, LoadError, StartupError};
pub use pipeline::GlarePipeline;
pub use source::OpticalImage;
