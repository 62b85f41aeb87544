//! Logging-only backends for dry runs without a host screen.

use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::info;

use super::{GestureDevice, ScreenCapture, TextDetector};
use crate::script::Rect;

/// Accepts every gesture and captures blank white regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDevice;

impl GestureDevice for SimulatedDevice {
    async fn tap(&self, x: f32, y: f32) -> bool {
        info!(x, y, "simulated tap");
        true
    }

    async fn swipe(&self, x1: f32, y1: f32, x2: f32, y2: f32, duration_ms: u64) -> bool {
        info!(x1, y1, x2, y2, duration_ms, "simulated swipe");
        true
    }
}

impl ScreenCapture for SimulatedDevice {
    async fn capture_region(&self, region: Rect) -> Result<DynamicImage> {
        let width = region.width().round().max(1.0) as u32;
        let height = region.height().round().max(1.0) as u32;
        info!(%region, width, height, "simulated capture");
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        )))
    }
}

/// Reads nothing from any image.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankDetector;

impl TextDetector for BlankDetector {
    async fn detect_text(&self, image: &RgbaImage) -> Result<String> {
        info!(width = image.width(), height = image.height(), "simulated text detection");
        Ok(String::new())
    }
}
