//! Frame drivers: turn paint requests into pipeline runs and present results.
//!
//! [`FrameDriver`] runs the pipeline on the calling thread. [`BackgroundDriver`]
//! moves the pipeline onto a worker thread and delivers finished frames over a
//! channel, so the caller never blocks on a frame.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbaImage;

use crate::error::{ComputeError, LoadError};

/// A finished frame, ready for display.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    /// Running frame counter of the source.
    pub index: u64,
    /// Load generation of the scene the frame was computed from.
    pub generation: u64,
    /// Peak PSF intensity, for glare frames.
    pub psf_max: Option<f32>,
    /// Exposure the tone mapper used, for glare frames.
    pub exposure: Option<f32>,
}

/// Anything that can compute frames on demand.
pub trait FrameSource {
    /// Run one full pipeline pass. `Ok(None)` means there is nothing to draw yet.
    fn render_frame(&mut self) -> Result<Option<Frame>, ComputeError>;
}

/// Display target for finished frames.
pub trait RenderSurface {
    fn present(&mut self, frame: &Frame);
}

/// Surface that keeps the most recent frame in memory.
#[derive(Debug, Default)]
pub struct MemorySurface {
    frame: Option<Frame>,
    presented: u64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl RenderSurface for MemorySurface {
    fn present(&mut self, frame: &Frame) {
        self.frame = Some(frame.clone());
        self.presented += 1;
    }
}

/// What happened to one paint request.
#[derive(Debug)]
pub enum PaintOutcome {
    Presented { index: u64 },
    /// No scene loaded; nothing was drawn.
    Idle,
    /// The frame failed and was dropped; the surface still shows the previous one.
    Failed(ComputeError),
}

/// Synchronous driver: one pipeline run per paint request, on the caller's thread.
pub struct FrameDriver<S, R> {
    source: S,
    surface: R,
    failed: u64,
}

impl<S: FrameSource, R: RenderSurface> FrameDriver<S, R> {
    pub fn new(source: S, surface: R) -> Self {
        Self {
            source,
            surface,
            failed: 0,
        }
    }

    pub fn paint(&mut self) -> PaintOutcome {
        match self.source.render_frame() {
            Ok(Some(frame)) => {
                self.surface.present(&frame);
                PaintOutcome::Presented { index: frame.index }
            }
            Ok(None) => PaintOutcome::Idle,
            Err(e) => {
                self.failed += 1;
                tracing::error!(error = %e, kernel = %e.kernel(), "Frame aborted, keeping previous frame");
                PaintOutcome::Failed(e)
            }
        }
    }

    /// Paint `frames` times, `tick` apart.
    pub fn run(&mut self, frames: u32, tick: Duration) {
        for i in 0..frames {
            if i > 0 && !tick.is_zero() {
                std::thread::sleep(tick);
            }
            if let PaintOutcome::Idle = self.paint() {
                tracing::warn!("Nothing to render, stopping");
                break;
            }
        }
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }
}

type ReloadFn<S> = Box<dyn FnOnce(&mut S) -> Result<(), LoadError> + Send>;

enum Request<S> {
    Render { id: u64 },
    Reload(ReloadFn<S>),
}

enum Completion {
    Rendered {
        id: u64,
        result: Result<Option<Frame>, ComputeError>,
    },
    Reloaded(Result<(), LoadError>),
}

/// Result of one completion delivered by [`BackgroundDriver`].
#[derive(Debug)]
pub enum DriverEvent {
    Presented { id: u64, index: u64 },
    Idle { id: u64 },
    /// A newer request arrived before this frame finished.
    Discarded { id: u64 },
    Failed { id: u64, error: ComputeError },
    Reloaded(Result<(), LoadError>),
}

/// Runs a [`FrameSource`] on a dedicated worker thread.
///
/// Render requests that queue up behind a running frame are coalesced into
/// one. A finished frame is only presented if no newer request was made while
/// it was computing. Reloads run on the worker, so they wait for the in-flight
/// frame and never swap resources under it.
pub struct BackgroundDriver<S> {
    request_tx: Option<Sender<Request<S>>>,
    completion_rx: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    latest: Option<u64>,
}

impl<S: FrameSource + Send + 'static> BackgroundDriver<S> {
    pub fn spawn(source: S) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request<S>>();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();

        let worker = std::thread::Builder::new()
            .name("glare-frames".to_string())
            .spawn(move || worker_loop(source, request_rx, completion_tx))?;

        Ok(Self {
            request_tx: Some(request_tx),
            completion_rx,
            worker: Some(worker),
            next_id: 0,
            latest: None,
        })
    }

    /// Ask for a new frame. Returns the request id, or `None` after shutdown.
    pub fn request_frame(&mut self) -> Option<u64> {
        let tx = self.request_tx.as_ref()?;
        let id = self.next_id;
        tx.send(Request::Render { id }).ok()?;
        self.next_id += 1;
        self.latest = Some(id);
        Some(id)
    }

    /// Run `load` against the source on the worker, after any in-flight frame.
    pub fn reload<F>(&self, load: F) -> bool
    where
        F: FnOnce(&mut S) -> Result<(), LoadError> + Send + 'static,
    {
        match &self.request_tx {
            Some(tx) => tx.send(Request::Reload(Box::new(load))).is_ok(),
            None => false,
        }
    }

    /// Handle every completion that is already available.
    pub fn poll<R: RenderSurface>(&mut self, surface: &mut R) -> Vec<DriverEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            events.push(self.handle(completion, surface));
        }
        events
    }

    /// Block up to `timeout` for the next completion.
    pub fn wait<R: RenderSurface>(&mut self, surface: &mut R, timeout: Duration) -> Option<DriverEvent> {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => Some(self.handle(completion, surface)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn handle<R: RenderSurface>(&mut self, completion: Completion, surface: &mut R) -> DriverEvent {
        match completion {
            Completion::Reloaded(result) => {
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Reload rejected");
                }
                DriverEvent::Reloaded(result)
            }
            Completion::Rendered { id, .. } if self.latest.is_some_and(|latest| id < latest) => {
                tracing::debug!(id, "Stale frame discarded");
                DriverEvent::Discarded { id }
            }
            Completion::Rendered { id, result } => match result {
                Ok(Some(frame)) => {
                    surface.present(&frame);
                    DriverEvent::Presented {
                        id,
                        index: frame.index,
                    }
                }
                Ok(None) => DriverEvent::Idle { id },
                Err(error) => {
                    tracing::error!(id, error = %error, "Frame aborted, keeping previous frame");
                    DriverEvent::Failed { id, error }
                }
            },
        }
    }

    /// Stop the worker after it finishes queued work.
    pub fn shutdown(&mut self) {
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<S> Drop for BackgroundDriver<S> {
    fn drop(&mut self) {
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop<S: FrameSource>(
    mut source: S,
    requests: Receiver<Request<S>>,
    completions: Sender<Completion>,
) {
    let mut pending = requests.recv().ok();
    while let Some(request) = pending.take() {
        match request {
            Request::Reload(load) => {
                let result = load(&mut source);
                if completions.send(Completion::Reloaded(result)).is_err() {
                    return;
                }
            }
            Request::Render { mut id } => {
                // Collapse queued render requests into the newest one.
                while let Ok(next) = requests.try_recv() {
                    match next {
                        Request::Render { id: newer } => id = newer,
                        other => {
                            pending = Some(other);
                            break;
                        }
                    }
                }
                let result = source.render_frame();
                if completions.send(Completion::Rendered { id, result }).is_err() {
                    return;
                }
            }
        }
        if pending.is_none() {
            pending = requests.recv().ok();
        }
    }
}
