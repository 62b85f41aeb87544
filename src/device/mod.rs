//! Host capabilities the engine drives: gestures, region capture, text
//! detection and the license gate.
//!
//! Platform backends implement these traits; this crate ships only the
//! logging-only [`SimulatedDevice`] and [`BlankDetector`] used for dry runs.

pub mod license;
pub mod simulated;

pub use license::ExpiryLicense;
pub use simulated::{BlankDetector, SimulatedDevice};

use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, RgbaImage};

use crate::script::Rect;

/// Dispatches synthetic touch gestures on the host screen.
pub trait GestureDevice: Send + Sync + 'static {
    /// Returns `false` when the host rejected or failed to deliver the tap.
    fn tap(&self, x: f32, y: f32) -> impl Future<Output = bool> + Send;

    /// Returns `false` when the host rejected or failed to deliver the swipe.
    fn swipe(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        duration_ms: u64,
    ) -> impl Future<Output = bool> + Send;
}

/// Captures a region of the host screen.
///
/// The returned image may be in any pixel layout; callers normalize it.
pub trait ScreenCapture: Send + Sync + 'static {
    fn capture_region(&self, region: Rect) -> impl Future<Output = Result<DynamicImage>> + Send;
}

/// Platform OCR. May return an empty string when nothing was read.
pub trait TextDetector: Send + Sync + 'static {
    fn detect_text(&self, image: &RgbaImage) -> impl Future<Output = Result<String>> + Send;
}

/// Opaque validity check consulted before and during every run.
pub trait LicenseGate: Send + Sync + 'static {
    fn is_valid(&self) -> bool;

    /// Records user activity. Called when a run is accepted.
    fn touch_activity(&self);

    /// Whether an invalid gate is invalid because it ran out, as opposed to
    /// never having been granted.
    fn is_expired(&self) -> bool {
        false
    }
}

impl<T: GestureDevice> GestureDevice for Arc<T> {
    fn tap(&self, x: f32, y: f32) -> impl Future<Output = bool> + Send {
        (**self).tap(x, y)
    }

    fn swipe(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        duration_ms: u64,
    ) -> impl Future<Output = bool> + Send {
        (**self).swipe(x1, y1, x2, y2, duration_ms)
    }
}

impl<T: ScreenCapture> ScreenCapture for Arc<T> {
    fn capture_region(&self, region: Rect) -> impl Future<Output = Result<DynamicImage>> + Send {
        (**self).capture_region(region)
    }
}

impl<T: TextDetector> TextDetector for Arc<T> {
    fn detect_text(&self, image: &RgbaImage) -> impl Future<Output = Result<String>> + Send {
        (**self).detect_text(image)
    }
}

impl<T: LicenseGate> LicenseGate for Arc<T> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn touch_activity(&self) {
        (**self).touch_activity()
    }

    fn is_expired(&self) -> bool {
        (**self).is_expired()
    }
}

/// A gate that is always open. Used by the dry-run binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl LicenseGate for AlwaysValid {
    fn is_valid(&self) -> bool {
        true
    }

    fn touch_activity(&self) {}
}
