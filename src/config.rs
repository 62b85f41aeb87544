//! Runtime configuration.
//!
//! Loads timing and recognition settings from config.json. Every field has a
//! default, so a partial file (or none at all) still yields a usable config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Timing of gesture settle delays and the repeat interval, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Pause after a tap before the next step
    pub click_settle_ms: u64,
    /// Pause after a swipe before the next step
    pub swipe_settle_ms: u64,
    /// Duration of the swipe gesture itself
    pub swipe_duration_ms: u64,
    /// Pause between passes of a repeating script
    pub repeat_interval_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            click_settle_ms: 500,
            swipe_settle_ms: 800,
            swipe_duration_ms: 500,
            repeat_interval_ms: 1000,
        }
    }
}

/// One attempt in the recognition cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// OCR on the captured image as-is
    Baseline,
    /// Fixed upscale followed by the binarize/erode/dilate/sharpen chain
    Enhanced,
    /// Linear contrast stretch
    HighContrast,
    /// Gamma correction
    Gamma,
    /// The enhancement chain at each configured scale factor
    ScaleSweep,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Baseline => write!(f, "baseline"),
            Strategy::Enhanced => write!(f, "enhanced"),
            Strategy::HighContrast => write!(f, "high_contrast"),
            Strategy::Gamma => write!(f, "gamma"),
            Strategy::ScaleSweep => write!(f, "scale_sweep"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Stages tried in order until one matches
    pub strategies: Vec<Strategy>,
    /// Binarization threshold as a fraction of mean luminance
    pub binarize_ratio: f32,
    /// The enhanced stage upscales to at least this width...
    pub upscale_target_width: u32,
    /// ...and this height...
    pub upscale_target_height: u32,
    /// ...and never by less than this factor
    pub upscale_min_factor: f32,
    /// Factors tried by the scale sweep, in order
    pub scale_factors: Vec<f32>,
    /// Allowed difference for numeric Equals. 0.0 means exact.
    pub equality_tolerance: f64,
    pub contrast_gain: f32,
    pub contrast_offset: f32,
    pub gamma: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            strategies: vec![Strategy::Baseline, Strategy::Enhanced, Strategy::ScaleSweep],
            binarize_ratio: 0.7,
            upscale_target_width: 1200,
            upscale_target_height: 800,
            upscale_min_factor: 4.0,
            scale_factors: vec![0.5, 0.75, 1.0, 1.5, 2.0, 3.0],
            equality_tolerance: 0.0,
            contrast_gain: 1.5,
            contrast_offset: -50.0,
            gamma: 1.2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub recognition: RecognitionConfig,
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        info!(path = %path.display(), "looking for config");

        if !path.exists() {
            info!("config.json not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    info!("config loaded from config.json");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse config.json, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to read config.json, using defaults");
                Self::default()
            }
        }
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }
}
