//! Typed script steps and their persisted record form.
//!
//! A step is stored as `{ "type": "CLICK", "params": { "x": 100, "y": 200 } }`.
//! Conversion from the record validates everything the editor is supposed to
//! guarantee (region size, target/comparison pairing), so a hand-edited or
//! corrupted scripts file cannot smuggle an invalid step into the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::geometry::{GeometryError, Rect};

/// Wait duration used when a stored WAIT step has no `duration` parameter.
pub const DEFAULT_WAIT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("comparison {comparison} cannot be used with a {target} target")]
    MismatchedComparison {
        comparison: Comparison,
        target: &'static str,
    },
    #[error("invalid region: {0}")]
    Region(#[from] GeometryError),
    #[error("missing parameter `{0}`")]
    MissingParam(&'static str),
    #[error("parameter `{name}` has an invalid value: {value}")]
    InvalidParam { name: &'static str, value: String },
}

/// What a recognition step is looking for.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Number(f64),
    Text(String),
}

impl Target {
    fn kind(&self) -> &'static str {
        match self {
            Target::Number(_) => "number",
            Target::Text(_) => "text",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Number(n) => write!(f, "{}", n),
            Target::Text(t) => write!(f, "\"{}\"", t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparison {
    LessThan,
    Equals,
    Contains,
}

impl Comparison {
    /// `LessThan`/`Equals` pair with numbers, `Contains` with text.
    pub fn accepts(&self, target: &Target) -> bool {
        matches!(
            (self, target),
            (Comparison::LessThan | Comparison::Equals, Target::Number(_))
                | (Comparison::Contains, Target::Text(_))
        )
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::LessThan => write!(f, "LessThan"),
            Comparison::Equals => write!(f, "Equals"),
            Comparison::Contains => write!(f, "Contains"),
        }
    }
}

/// A region check: capture `region`, read it, and compare against `target`.
///
/// Only constructible through [`Recognition::new`], which enforces the
/// target/comparison pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    region: Rect,
    target: Target,
    comparison: Comparison,
}

impl Recognition {
    pub fn new(region: Rect, target: Target, comparison: Comparison) -> Result<Self, StepError> {
        if !comparison.accepts(&target) {
            return Err(StepError::MismatchedComparison {
                comparison,
                target: target.kind(),
            });
        }
        Ok(Self {
            region,
            target,
            comparison,
        })
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Click,
    Swipe,
    Wait,
    Recognize,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Click => write!(f, "Click"),
            StepKind::Swipe => write!(f, "Swipe"),
            StepKind::Wait => write!(f, "Wait"),
            StepKind::Recognize => write!(f, "Recognize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StepRecord", into = "StepRecord")]
pub enum Step {
    Click { x: f32, y: f32 },
    Swipe { x1: f32, y1: f32, x2: f32, y2: f32 },
    Wait { duration_ms: u64 },
    Recognize(Recognition),
}

impl Step {
    pub fn click(x: f32, y: f32) -> Self {
        Step::Click { x, y }
    }

    pub fn swipe(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Step::Swipe { x1, y1, x2, y2 }
    }

    pub fn wait(duration_ms: u64) -> Self {
        Step::Wait { duration_ms }
    }

    pub fn recognize(
        region: Rect,
        target: Target,
        comparison: Comparison,
    ) -> Result<Self, StepError> {
        Recognition::new(region, target, comparison).map(Step::Recognize)
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Click { .. } => StepKind::Click,
            Step::Swipe { .. } => StepKind::Swipe,
            Step::Wait { .. } => StepKind::Wait,
            Step::Recognize(_) => StepKind::Recognize,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Click { x, y } => write!(f, "Click({}, {})", x, y),
            Step::Swipe { x1, y1, x2, y2 } => {
                write!(f, "Swipe({}, {} -> {}, {})", x1, y1, x2, y2)
            }
            Step::Wait { duration_ms } => write!(f, "Wait({}ms)", duration_ms),
            Step::Recognize(r) => write!(
                f,
                "Recognize({} {} {})",
                r.region, r.comparison, r.target
            ),
        }
    }
}

// ── Persisted form ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepType {
    Click,
    Swipe,
    Wait,
    Ocr,
}

/// The on-disk shape of a step: a type tag plus string-keyed scalar params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn number_param(params: &Map<String, Value>, name: &'static str) -> Result<f64, StepError> {
    let value = params.get(name).ok_or(StepError::MissingParam(name))?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| StepError::InvalidParam {
            name,
            value: value.to_string(),
        })
}

fn coord_param(params: &Map<String, Value>, name: &'static str) -> Result<f32, StepError> {
    number_param(params, name).map(|v| v as f32)
}

impl TryFrom<StepRecord> for Step {
    type Error = StepError;

    fn try_from(record: StepRecord) -> Result<Self, Self::Error> {
        let p = &record.params;
        match record.step_type {
            StepType::Click => Ok(Step::click(coord_param(p, "x")?, coord_param(p, "y")?)),
            StepType::Swipe => Ok(Step::swipe(
                coord_param(p, "startX")?,
                coord_param(p, "startY")?,
                coord_param(p, "endX")?,
                coord_param(p, "endY")?,
            )),
            StepType::Wait => {
                let duration_ms = match p.get("duration") {
                    None => DEFAULT_WAIT_MS,
                    Some(v) => v.as_u64().ok_or_else(|| StepError::InvalidParam {
                        name: "duration",
                        value: v.to_string(),
                    })?,
                };
                Ok(Step::wait(duration_ms))
            }
            StepType::Ocr => {
                let region = Rect::new(
                    coord_param(p, "left")?,
                    coord_param(p, "top")?,
                    coord_param(p, "right")?,
                    coord_param(p, "bottom")?,
                )?;
                let raw = p
                    .get("comparisonType")
                    .ok_or(StepError::MissingParam("comparisonType"))?;
                let comparison: Comparison =
                    serde_json::from_value(raw.clone()).map_err(|_| StepError::InvalidParam {
                        name: "comparisonType",
                        value: raw.to_string(),
                    })?;

                let target = match comparison {
                    Comparison::Contains => {
                        let text = p
                            .get("targetText")
                            .and_then(Value::as_str)
                            .ok_or(StepError::MissingParam("targetText"))?;
                        Target::Text(text.to_string())
                    }
                    Comparison::LessThan | Comparison::Equals => {
                        Target::Number(number_param(p, "targetNumber")?)
                    }
                };

                Step::recognize(region, target, comparison)
            }
        }
    }
}

impl From<Step> for StepRecord {
    fn from(step: Step) -> Self {
        let mut params = Map::new();
        let step_type = match step {
            Step::Click { x, y } => {
                params.insert("x".into(), Value::from(x));
                params.insert("y".into(), Value::from(y));
                StepType::Click
            }
            Step::Swipe { x1, y1, x2, y2 } => {
                params.insert("startX".into(), Value::from(x1));
                params.insert("startY".into(), Value::from(y1));
                params.insert("endX".into(), Value::from(x2));
                params.insert("endY".into(), Value::from(y2));
                StepType::Swipe
            }
            Step::Wait { duration_ms } => {
                params.insert("duration".into(), Value::from(duration_ms));
                StepType::Wait
            }
            Step::Recognize(r) => {
                params.insert("left".into(), Value::from(r.region.left()));
                params.insert("top".into(), Value::from(r.region.top()));
                params.insert("right".into(), Value::from(r.region.right()));
                params.insert("bottom".into(), Value::from(r.region.bottom()));
                params.insert(
                    "comparisonType".into(),
                    serde_json::to_value(r.comparison).unwrap_or(Value::Null),
                );
                match r.target {
                    Target::Number(n) => {
                        params.insert("targetNumber".into(), Value::from(n));
                    }
                    Target::Text(t) => {
                        params.insert("targetText".into(), Value::from(t));
                    }
                }
                StepType::Ocr
            }
        };
        StepRecord { step_type, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region() -> Rect {
        Rect::new(0.0, 0.0, 200.0, 100.0).unwrap()
    }

    #[test]
    fn test_comparison_pairing() {
        assert!(Step::recognize(region(), Target::Number(20.0), Comparison::Equals).is_ok());
        assert!(Step::recognize(region(), Target::Number(20.0), Comparison::LessThan).is_ok());
        assert!(
            Step::recognize(region(), Target::Text("ok".into()), Comparison::Contains).is_ok()
        );

        assert!(matches!(
            Step::recognize(region(), Target::Number(1.0), Comparison::Contains),
            Err(StepError::MismatchedComparison { target: "number", .. })
        ));
        assert!(matches!(
            Step::recognize(region(), Target::Text("ok".into()), Comparison::LessThan),
            Err(StepError::MismatchedComparison { target: "text", .. })
        ));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Step::swipe(0.0, 0.0, 1.0, 1.0).kind().to_string(), "Swipe");
        assert_eq!(Step::click(1.0, 2.0).to_string(), "Click(1, 2)");
    }

    #[test]
    fn test_parse_click_record() {
        let step: Step =
            serde_json::from_value(json!({"type": "CLICK", "params": {"x": 100, "y": 200.5}}))
                .unwrap();
        assert_eq!(step, Step::click(100.0, 200.5));
    }

    #[test]
    fn test_wait_defaults_duration() {
        let step: Step = serde_json::from_value(json!({"type": "WAIT", "params": {}})).unwrap();
        assert_eq!(step, Step::wait(DEFAULT_WAIT_MS));
    }

    #[test]
    fn test_parse_text_ocr_record() {
        let step: Step = serde_json::from_value(json!({
            "type": "OCR",
            "params": {
                "left": 10, "top": 10, "right": 300, "bottom": 90,
                "comparisonType": "CONTAINS", "targetText": "Confirm"
            }
        }))
        .unwrap();

        let Step::Recognize(r) = step else {
            panic!("expected a recognize step");
        };
        assert_eq!(r.comparison(), Comparison::Contains);
        assert_eq!(r.target(), &Target::Text("Confirm".into()));
        assert_eq!(r.region().width(), 290.0);
    }

    #[test]
    fn test_ocr_record_with_small_region_rejected() {
        let result: Result<Step, _> = serde_json::from_value(json!({
            "type": "OCR",
            "params": {
                "left": 0, "top": 0, "right": 20, "bottom": 20,
                "comparisonType": "EQUALS", "targetNumber": 5
            }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_ocr_record_missing_target_rejected() {
        let result: Result<Step, _> = serde_json::from_value(json!({
            "type": "OCR",
            "params": {
                "left": 0, "top": 0, "right": 100, "bottom": 100,
                "comparisonType": "LESS_THAN", "targetText": "5"
            }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_shape_of_swipe() {
        let value = serde_json::to_value(Step::swipe(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(value["type"], "SWIPE");
        assert_eq!(value["params"]["endY"], 4.0);
    }
}
