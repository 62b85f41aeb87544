//! Recognition cascade: capture a region once, then run OCR over
//! progressively heavier enhancements until one reading satisfies the
//! comparison.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, info, warn};

use super::extract::{contains_text, satisfies_number, NumberParser};
use super::preprocess;
use crate::config::{RecognitionConfig, Strategy};
use crate::device::{ScreenCapture, TextDetector};
use crate::script::{Comparison, Rect, Target};

/// A value read from the screen that satisfied the step's comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognized {
    Number(f64),
    Text(String),
}

impl fmt::Display for Recognized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Number(n) => write!(f, "{}", n),
            Recognized::Text(t) => write!(f, "\"{}\"", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Success(Recognized),
    Failure { reason: String },
}

/// What a stage read, when it did not satisfy the comparison.
enum Reading {
    Matched(Recognized),
    Mismatch(String),
    Nothing,
}

pub struct RecognitionCascade<C, O> {
    capture: C,
    detector: O,
    parser: NumberParser,
    config: RecognitionConfig,
}

impl<C: ScreenCapture, O: TextDetector> RecognitionCascade<C, O> {
    pub fn new(capture: C, detector: O, config: RecognitionConfig) -> Result<Self> {
        Ok(Self {
            capture,
            detector,
            parser: NumberParser::new()?,
            config,
        })
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Runs the configured stages in order and reports exactly one outcome.
    ///
    /// A failed capture ends the call immediately. A failed OCR call only
    /// skips the stage it happened in.
    pub async fn recognize(
        &self,
        region: Rect,
        target: &Target,
        comparison: Comparison,
    ) -> RecognitionOutcome {
        let captured = match self.capture.capture_region(region).await {
            Ok(image) => Arc::new(preprocess::normalize(image)),
            Err(e) => {
                warn!(%region, error = %e, "region capture failed");
                return RecognitionOutcome::Failure {
                    reason: format!("capture failed: {:#}", e),
                };
            }
        };

        let mut last_seen: Option<String> = None;

        for &strategy in &self.config.strategies {
            if let Some(value) = self
                .run_stage(strategy, &captured, target, comparison, &mut last_seen)
                .await
            {
                info!(stage = %strategy, %value, "recognition matched");
                return RecognitionOutcome::Success(value);
            }
        }

        let reason = match last_seen {
            Some(seen) => format!(
                "no stage satisfied {} {}; last recognized {}",
                comparison, target, seen
            ),
            None => format!(
                "no stage satisfied {} {}; nothing was recognized",
                comparison, target
            ),
        };
        debug!(%reason, "recognition exhausted");
        RecognitionOutcome::Failure { reason }
    }

    async fn run_stage(
        &self,
        strategy: Strategy,
        captured: &Arc<RgbaImage>,
        target: &Target,
        comparison: Comparison,
        last_seen: &mut Option<String>,
    ) -> Option<Recognized> {
        let cfg = &self.config;
        match strategy {
            Strategy::Baseline => {
                self.attempt(strategy, captured, target, comparison, last_seen)
                    .await
            }
            Strategy::Enhanced => {
                let factor = preprocess::upscale_factor(
                    captured,
                    cfg.upscale_target_width,
                    cfg.upscale_target_height,
                    cfg.upscale_min_factor,
                );
                let enhanced =
                    enhance_off_thread(strategy, captured, factor, cfg.binarize_ratio).await?;
                debug!(stage = %strategy, factor, "enhanced image ready");
                self.attempt(strategy, &enhanced, target, comparison, last_seen)
                    .await
            }
            Strategy::HighContrast => {
                let image =
                    preprocess::adjust_contrast(captured, cfg.contrast_gain, cfg.contrast_offset);
                self.attempt(strategy, &image, target, comparison, last_seen)
                    .await
            }
            Strategy::Gamma => {
                let image = preprocess::adjust_gamma(captured, cfg.gamma);
                self.attempt(strategy, &image, target, comparison, last_seen)
                    .await
            }
            Strategy::ScaleSweep => {
                for &factor in &cfg.scale_factors {
                    let Some(enhanced) =
                        enhance_off_thread(strategy, captured, factor, cfg.binarize_ratio).await
                    else {
                        continue;
                    };
                    debug!(stage = %strategy, scale = factor, "trying scale");
                    if let Some(value) = self
                        .attempt(strategy, &enhanced, target, comparison, last_seen)
                        .await
                    {
                        return Some(value);
                    }
                }
                None
            }
        }
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        image: &RgbaImage,
        target: &Target,
        comparison: Comparison,
        last_seen: &mut Option<String>,
    ) -> Option<Recognized> {
        let text = match self.detector.detect_text(image).await {
            Ok(text) => text,
            Err(e) => {
                warn!(stage = %strategy, error = %e, "text detection failed");
                return None;
            }
        };

        match self.read(text.trim(), target, comparison) {
            Reading::Matched(value) => Some(value),
            Reading::Mismatch(seen) => {
                debug!(stage = %strategy, %seen, "reading did not satisfy comparison");
                *last_seen = Some(seen);
                None
            }
            Reading::Nothing => {
                debug!(stage = %strategy, "nothing recognized");
                None
            }
        }
    }

    fn read(&self, text: &str, target: &Target, comparison: Comparison) -> Reading {
        if text.is_empty() {
            return Reading::Nothing;
        }

        match target {
            Target::Number(goal) => match self.parser.extract(text) {
                Some(value)
                    if satisfies_number(value, *goal, comparison, self.config.equality_tolerance) =>
                {
                    Reading::Matched(Recognized::Number(value))
                }
                Some(value) => Reading::Mismatch(value.to_string()),
                None => Reading::Mismatch(format!("\"{}\" (no number)", text)),
            },
            Target::Text(goal) => {
                if comparison == Comparison::Contains && contains_text(text, goal) {
                    Reading::Matched(Recognized::Text(text.to_string()))
                } else {
                    Reading::Mismatch(format!("\"{}\"", text))
                }
            }
        }
    }
}

/// Scales and enhances on the blocking pool; these passes touch every pixel
/// of an image up to 16x the captured size.
async fn enhance_off_thread(
    strategy: Strategy,
    captured: &Arc<RgbaImage>,
    factor: f32,
    binarize_ratio: f32,
) -> Option<RgbaImage> {
    let source = Arc::clone(captured);
    let task = tokio::task::spawn_blocking(move || {
        let scaled = preprocess::scale(&source, factor);
        preprocess::enhance(&scaled, binarize_ratio)
    });
    match task.await {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(stage = %strategy, error = %e, "enhancement task failed");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::{DynamicImage, Rgba};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns a fixed image for every capture, or an error when `fail` is set.
    pub(crate) struct FixedCapture {
        pub image: RgbaImage,
        pub fail: bool,
    }

    impl FixedCapture {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                image: RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255])),
                fail: false,
            }
        }
    }

    impl ScreenCapture for FixedCapture {
        async fn capture_region(&self, _region: Rect) -> Result<DynamicImage> {
            if self.fail {
                return Err(anyhow!("screen unavailable"));
            }
            Ok(DynamicImage::ImageRgba8(self.image.clone()))
        }
    }

    /// Answers OCR calls from a queue, then with empty strings.
    #[derive(Default)]
    pub(crate) struct ScriptedDetector {
        responses: Mutex<VecDeque<Result<String>>>,
        pub sizes: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedDetector {
        pub(crate) fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| Ok(r.to_string())).collect()),
                sizes: Mutex::new(Vec::new()),
            }
        }

        fn push_error(&self, message: &'static str) {
            self.responses.lock().unwrap().push_back(Err(anyhow!(message)));
        }

        pub(crate) fn calls(&self) -> usize {
            self.sizes.lock().unwrap().len()
        }
    }

    impl TextDetector for ScriptedDetector {
        async fn detect_text(&self, image: &RgbaImage) -> Result<String> {
            self.sizes.lock().unwrap().push(image.dimensions());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    /// Reads "20" from any image at least 200px wide, "29" otherwise.
    struct SizeDetector;

    impl TextDetector for SizeDetector {
        async fn detect_text(&self, image: &RgbaImage) -> Result<String> {
            Ok(if image.width() >= 200 { "20" } else { "29" }.to_string())
        }
    }

    pub(crate) fn small_config() -> RecognitionConfig {
        // Keep the fixed upscale at the 4x floor so test images stay small.
        RecognitionConfig {
            upscale_target_width: 0,
            upscale_target_height: 0,
            ..RecognitionConfig::default()
        }
    }

    fn region() -> Rect {
        Rect::new(0.0, 0.0, 100.0, 50.0).unwrap()
    }

    #[tokio::test]
    async fn test_baseline_match_stops_cascade() {
        let cascade =
            RecognitionCascade::new(FixedCapture::new(60, 20), ScriptedDetector::new(&["20"]), small_config())
                .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Number(20.0), Comparison::Equals)
            .await;
        assert_eq!(outcome, RecognitionOutcome::Success(Recognized::Number(20.0)));
        assert_eq!(cascade.detector.calls(), 1);
    }

    #[tokio::test]
    async fn test_enhanced_stage_after_baseline_miss() {
        let cascade = RecognitionCascade::new(
            FixedCapture::new(60, 20),
            ScriptedDetector::new(&["29", "20"]),
            small_config(),
        )
        .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Number(20.0), Comparison::Equals)
            .await;
        assert_eq!(outcome, RecognitionOutcome::Success(Recognized::Number(20.0)));

        let sizes = cascade.detector.sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![(60, 20), (240, 80)], "baseline then 4x enhanced");
    }

    #[tokio::test]
    async fn test_scale_sweep_runs_each_factor() {
        let cascade =
            RecognitionCascade::new(FixedCapture::new(40, 20), ScriptedDetector::new(&[]), small_config())
                .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Number(5.0), Comparison::LessThan)
            .await;
        assert!(matches!(outcome, RecognitionOutcome::Failure { .. }));

        let sizes = cascade.detector.sizes.lock().unwrap().clone();
        assert_eq!(
            sizes,
            vec![
                (40, 20),
                (160, 80),
                (20, 10),
                (30, 15),
                (40, 20),
                (60, 30),
                (80, 40),
                (120, 60),
            ]
        );
    }

    #[tokio::test]
    async fn test_sweep_stops_at_first_matching_scale() {
        let cascade = RecognitionCascade::new(
            FixedCapture::new(40, 20),
            ScriptedDetector::new(&["", "", "9", "7", "3"]),
            small_config(),
        )
        .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Number(5.0), Comparison::LessThan)
            .await;
        assert_eq!(outcome, RecognitionOutcome::Success(Recognized::Number(3.0)));
        assert_eq!(cascade.detector.calls(), 5);
    }

    #[tokio::test]
    async fn test_failure_names_last_reading() {
        let cascade = RecognitionCascade::new(
            FixedCapture::new(40, 20),
            ScriptedDetector::new(&["29", "31"]),
            small_config(),
        )
        .unwrap();
        let RecognitionOutcome::Failure { reason } = cascade
            .recognize(region(), &Target::Number(20.0), Comparison::Equals)
            .await
        else {
            panic!("expected failure");
        };
        assert!(reason.contains("last recognized 31"), "{}", reason);
    }

    #[tokio::test]
    async fn test_text_contains_match() {
        let cascade = RecognitionCascade::new(
            FixedCapture::new(60, 20),
            ScriptedDetector::new(&["  Login Confirmed\n"]),
            small_config(),
        )
        .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Text("confirm".into()), Comparison::Contains)
            .await;
        assert_eq!(
            outcome,
            RecognitionOutcome::Success(Recognized::Text("Login Confirmed".into()))
        );
    }

    #[tokio::test]
    async fn test_capture_failure_is_terminal() {
        let mut capture = FixedCapture::new(60, 20);
        capture.fail = true;
        let cascade =
            RecognitionCascade::new(capture, ScriptedDetector::new(&["20"]), small_config()).unwrap();
        let RecognitionOutcome::Failure { reason } = cascade
            .recognize(region(), &Target::Number(20.0), Comparison::Equals)
            .await
        else {
            panic!("expected failure");
        };
        assert!(reason.starts_with("capture failed"));
        assert_eq!(cascade.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_ocr_error_only_fails_its_stage() {
        let detector = ScriptedDetector::default();
        detector.push_error("ocr engine busy");
        detector.responses.lock().unwrap().push_back(Ok("20".into()));
        let cascade =
            RecognitionCascade::new(FixedCapture::new(60, 20), detector, small_config()).unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Number(20.0), Comparison::Equals)
            .await;
        assert_eq!(outcome, RecognitionOutcome::Success(Recognized::Number(20.0)));
    }

    #[tokio::test]
    async fn test_optional_strategies() {
        let config = RecognitionConfig {
            strategies: vec![Strategy::HighContrast, Strategy::Gamma],
            ..small_config()
        };
        let cascade = RecognitionCascade::new(
            FixedCapture::new(60, 20),
            ScriptedDetector::new(&["x", "Ready"]),
            config,
        )
        .unwrap();
        let outcome = cascade
            .recognize(region(), &Target::Text("ready".into()), Comparison::Contains)
            .await;
        assert_eq!(outcome, RecognitionOutcome::Success(Recognized::Text("Ready".into())));
        assert_eq!(cascade.detector.calls(), 2);
    }

    #[tokio::test]
    async fn test_off_thread_enhancement_matches_inline() {
        let mut image = RgbaImage::from_pixel(12, 8, Rgba([220, 220, 220, 255]));
        for x in 3..9 {
            image.put_pixel(x, 4, Rgba([20, 20, 20, 255]));
        }
        let inline = preprocess::enhance(&preprocess::scale(&image, 2.0), 0.7);
        let pooled = enhance_off_thread(Strategy::Enhanced, &Arc::new(image), 2.0, 0.7)
            .await
            .unwrap();
        assert_eq!(pooled, inline);
    }

    #[tokio::test]
    async fn test_identical_input_gives_identical_outcome() {
        let cascade =
            RecognitionCascade::new(FixedCapture::new(60, 20), SizeDetector, small_config()).unwrap();
        let target = Target::Number(20.0);
        let first = cascade.recognize(region(), &target, Comparison::Equals).await;
        let second = cascade.recognize(region(), &target, Comparison::Equals).await;
        assert_eq!(first, second);
        assert_eq!(first, RecognitionOutcome::Success(Recognized::Number(20.0)));
    }
}
