//! Compute session: the worker pool, FFT plans and buffer pools every stage runs on.
//!
//! The session is built once at startup and shared (by reference or `Arc`) with
//! everything that dispatches work. Each dispatch blocks until the kernel has
//! finished, so stages never overlap.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::buffers::BufferPool;
use crate::error::{ComputeError, StartupError};

/// Named compute kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    RenderPupil,
    RenderGratings,
    RenderLensPoints,
    MergeImages,
    GenerateComplexExp,
    MultiplyComplexExp,
    Fft2d,
    SpectralBlur,
    Convolve,
    ToneMapReinhardExtended,
    LightFieldRender,
}

impl Kernel {
    pub const ALL: [Kernel; 11] = [
        Kernel::RenderPupil,
        Kernel::RenderGratings,
        Kernel::RenderLensPoints,
        Kernel::MergeImages,
        Kernel::GenerateComplexExp,
        Kernel::MultiplyComplexExp,
        Kernel::Fft2d,
        Kernel::SpectralBlur,
        Kernel::Convolve,
        Kernel::ToneMapReinhardExtended,
        Kernel::LightFieldRender,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::RenderPupil => "glr_render_pupil",
            Kernel::RenderGratings => "glr_render_gratings",
            Kernel::RenderLensPoints => "glr_render_lens_points",
            Kernel::MergeImages => "glr_merge_images",
            Kernel::GenerateComplexExp => "generate_complex_exp",
            Kernel::MultiplyComplexExp => "multiply_with_complex_exp",
            Kernel::Fft2d => "fft_2d",
            Kernel::SpectralBlur => "spectral_blur",
            Kernel::Convolve => "convolve_spectra",
            Kernel::ToneMapReinhardExtended => "tm_reinhard_extended",
            Kernel::LightFieldRender => "lf_render",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for building a [`ComputeSession`].
#[derive(Debug, Clone, Default)]
pub struct ComputeOptions {
    /// Worker threads; `None` lets rayon pick one per core.
    pub threads: Option<usize>,
    /// Skip the startup kernel check (used by the probe itself).
    pub skip_self_check: bool,
}

/// Explicitly owned compute context.
pub struct ComputeSession {
    pool: rayon::ThreadPool,
    planner: Mutex<FftPlanner<f32>>,
    plans: Mutex<HashMap<(usize, bool), Arc<dyn Fft<f32>>>>,
    pub(crate) real: BufferPool<f32>,
    pub(crate) complex: BufferPool<Complex32>,
    pub(crate) rgba: BufferPool<u8>,
}

impl ComputeSession {
    /// Build the pool and verify every kernel on a small probe frame.
    pub fn new(options: &ComputeOptions) -> Result<Self, StartupError> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("glare-compute-{i}"));
        if let Some(threads) = options.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let session = Self {
            pool,
            planner: Mutex::new(FftPlanner::new()),
            plans: Mutex::new(HashMap::new()),
            real: BufferPool::new(),
            complex: BufferPool::new(),
            rgba: BufferPool::new(),
        };

        tracing::info!(
            threads = session.pool.current_num_threads(),
            "Compute session created"
        );

        if !options.skip_self_check {
            crate::kernels::self_check(&session)?;
            session.release_buffers();
            tracing::info!(kernels = Kernel::ALL.len(), "All kernels passed startup check");
        }

        Ok(session)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one kernel to completion on the pool.
    ///
    /// Panics inside the body are caught and reported as [`ComputeError::Aborted`].
    pub fn dispatch<T, F>(&self, kernel: Kernel, body: F) -> Result<T, ComputeError>
    where
        F: FnOnce() -> Result<T, ComputeError> + Send,
        T: Send,
    {
        let span = tracing::debug_span!("dispatch", kernel = kernel.name());
        let _guard = span.enter();
        let started = Instant::now();

        let outcome = self
            .pool
            .install(|| panic::catch_unwind(AssertUnwindSafe(body)));

        match outcome {
            Ok(result) => {
                tracing::debug!(elapsed_us = started.elapsed().as_micros() as u64, "done");
                result
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ComputeError::Aborted { kernel, message })
            }
        }
    }

    /// Cached FFT plan of length `len`.
    pub fn fft_plan(&self, len: usize, inverse: bool) -> Arc<dyn Fft<f32>> {
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        plans
            .entry((len, inverse))
            .or_insert_with(|| {
                let direction = if inverse {
                    FftDirection::Inverse
                } else {
                    FftDirection::Forward
                };
                self.planner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .plan_fft(len, direction)
            })
            .clone()
    }

    /// Drop all pooled scratch buffers.
    pub fn release_buffers(&self) {
        self.real.clear();
        self.complex.clear();
        self.rgba.clear();
    }

    pub fn cached_buffers(&self) -> usize {
        self.real.cached() + self.complex.cached() + self.rgba.cached()
    }
}

/// Fail with [`ComputeError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn expect_len(kernel: Kernel, expected: usize, actual: usize) -> Result<(), ComputeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ComputeError::DimensionMismatch {
            kernel,
            expected,
            actual,
        })
    }
}

/// Fail with [`ComputeError::NonFinite`] if any sample is NaN or infinite.
pub(crate) fn expect_finite(kernel: Kernel, data: &[f32]) -> Result<(), ComputeError> {
    use rayon::prelude::*;

    if data.par_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ComputeError::NonFinite { kernel })
    }
}
