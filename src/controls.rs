//! Single-writer queue of parameter changes.
//!
//! UI-side code holds a [`ControlSender`]; the renderer owns the matching
//! [`ControlReceiver`] and drains it at the start of every frame, so no
//! parameter changes while a frame is being computed.

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;

use crate::config::ExposureMode;
use crate::optics::EPSILON;

pub const FOCUS_RANGE: (f32, f32) = (1.0, 15000.0);
pub const APERTURE_RANGE: (f32, f32) = (1.0, 100.0);
pub const FOV_RANGE: (f32, f32) = (2.0, 180.0);
pub const GAMMA_RANGE: (f32, f32) = (0.0, 10.0);
pub const WHITE_POINT_RANGE: (f32, f32) = (0.0, 14.0);
pub const ALPHA_RANGE: (f32, f32) = (-10.0, 10.0);

/// One user-facing parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    FieldLuminance(f32),
    Gamma(f32),
    WhitePoint(f32),
    Alpha(f32),
    ExposureMode(ExposureMode),
    /// Virtual camera focus distance.
    Focus(f32),
    /// Virtual camera aperture radius.
    Aperture(f32),
    /// Virtual camera field of view, degrees.
    Fov(f32),
    CameraPosition(Vec3),
}

fn clamp(value: f32, (lo, hi): (f32, f32)) -> f32 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

impl Control {
    /// The same control with its value forced into the accepted range.
    ///
    /// Gamma and white point are kept strictly positive even though their
    /// slider ranges start at zero.
    pub fn clamped(self) -> Self {
        match self {
            Control::FieldLuminance(v) => {
                Control::FieldLuminance(if v.is_finite() { v.max(EPSILON) } else { EPSILON })
            }
            Control::Gamma(v) => Control::Gamma(clamp(v, GAMMA_RANGE).max(EPSILON)),
            Control::WhitePoint(v) => Control::WhitePoint(clamp(v, WHITE_POINT_RANGE).max(EPSILON)),
            Control::Alpha(v) => Control::Alpha(clamp(v, ALPHA_RANGE)),
            Control::Focus(v) => Control::Focus(clamp(v, FOCUS_RANGE)),
            Control::Aperture(v) => Control::Aperture(clamp(v, APERTURE_RANGE)),
            Control::Fov(v) => Control::Fov(clamp(v, FOV_RANGE)),
            Control::CameraPosition(p) if !p.is_finite() => Control::CameraPosition(Vec3::ZERO),
            other => other,
        }
    }
}

/// Cloneable handle for submitting controls.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: Sender<Control>,
}

impl ControlSender {
    /// Queue a change. Returns `false` once the renderer is gone.
    pub fn send(&self, control: Control) -> bool {
        self.tx.send(control.clamped()).is_ok()
    }
}

/// Consumer end, owned by the renderer.
#[derive(Debug)]
pub struct ControlReceiver {
    rx: Receiver<Control>,
}

impl ControlReceiver {
    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Control> {
        self.rx.try_iter().collect()
    }
}

/// Create a connected sender/receiver pair.
pub fn control_queue() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ControlSender { tx }, ControlReceiver { rx })
}
