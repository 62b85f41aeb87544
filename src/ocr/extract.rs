use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::script::Comparison;

/// Recognized numbers outside this range are treated as misreads.
pub const MIN_VALID_NUMBER: f64 = -999_999_999.0;
pub const MAX_VALID_NUMBER: f64 = 999_999_999.0;

/// Plain integer: 12345, -7
const WHOLE_PATTERN: &str = r"^[+-]?[0-9]+$";
/// Decimal with a dot or comma separator: 12.5, 3,75
const DECIMAL_PATTERN: &str = r"^[+-]?[0-9]+[.,][0-9]+$";
/// Number followed by a unit suffix: 20pt, 99%, 1.5x
const UNIT_PATTERN: &str = r"^([+-]?[0-9]+(?:[.,][0-9]+)?)[a-zA-Z%]*$";
/// Thousands grouping: 12,345 or 1,234,567.5
const GROUPED_PATTERN: &str = r"^[+-]?[0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]+)?$";
/// First run of digits anywhere in the text: "HP 120/300" -> 120
const EMBEDDED_PATTERN: &str = r"([0-9]+(?:\.[0-9]+)?)";

/// Maps letters OCR commonly confuses with digits to the digit they resemble.
fn confusable_digit(c: char) -> Option<char> {
    match c {
        'O' | 'o' => Some('0'),
        'I' | 'l' => Some('1'),
        'S' | 's' => Some('5'),
        'Z' | 'z' => Some('2'),
        'B' => Some('8'),
        'g' => Some('9'),
        _ => None,
    }
}

/// Replaces every confusable glyph with its digit. Other characters are kept.
pub fn correct_ocr_errors(text: &str) -> String {
    text.chars()
        .map(|c| confusable_digit(c).unwrap_or(c))
        .collect()
}

pub fn is_valid_number(value: f64) -> bool {
    value.is_finite() && (MIN_VALID_NUMBER..=MAX_VALID_NUMBER).contains(&value)
}

/// Pulls a single number out of raw OCR text.
///
/// Tries progressively looser patterns so the most literal reading wins:
/// - whole number, decimal, grouped thousands, number with a unit suffix
/// - the same shapes after confusable-glyph correction, when the text is
///   nothing but digits and confusable glyphs ("z9" -> 29)
/// - the first embedded digit run ("HP 120/300" -> 120)
///
/// Correction is never applied to mixed text, so "Confirm" does not read as 0.
pub struct NumberParser {
    whole: Regex,
    decimal: Regex,
    unit: Regex,
    grouped: Regex,
    embedded: Regex,
}

impl NumberParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            whole: Regex::new(WHOLE_PATTERN)?,
            decimal: Regex::new(DECIMAL_PATTERN)?,
            unit: Regex::new(UNIT_PATTERN)?,
            grouped: Regex::new(GROUPED_PATTERN)?,
            embedded: Regex::new(EMBEDDED_PATTERN)?,
        })
    }

    /// Returns `None` when no valid number can be read.
    pub fn extract(&self, text: &str) -> Option<f64> {
        let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if clean.is_empty() {
            return None;
        }

        if let Some(value) = self.parse_exact(&clean) {
            debug!(text = %clean, value, "number read directly");
            return Some(value);
        }

        let looks_garbled = clean.chars().any(|c| confusable_digit(c).is_some())
            && clean
                .chars()
                .all(|c| c.is_ascii_digit() || confusable_digit(c).is_some() || "+-.,".contains(c));
        if looks_garbled {
            let corrected = correct_ocr_errors(&clean);
            if let Some(value) = self.parse_exact(&corrected) {
                debug!(text = %clean, %corrected, value, "number read after glyph correction");
                return Some(value);
            }
        }

        if let Some(value) = self.parse_embedded(&clean) {
            debug!(text = %clean, value, "number read from embedded digits");
            return Some(value);
        }

        debug!(text = %clean, "no number found");
        None
    }

    fn parse_exact(&self, text: &str) -> Option<f64> {
        if self.whole.is_match(text) {
            return to_number(text);
        }
        if self.grouped.is_match(text) {
            return to_number(&text.replace(',', ""));
        }
        if self.decimal.is_match(text) {
            return to_number(&text.replace(',', "."));
        }
        let caps = self.unit.captures(text)?;
        to_number(&caps.get(1)?.as_str().replace(',', "."))
    }

    fn parse_embedded(&self, text: &str) -> Option<f64> {
        let caps = self.embedded.captures(text)?;
        to_number(caps.get(1)?.as_str())
    }
}

fn to_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| is_valid_number(*v))
}

/// Numeric comparison between a recognized value and the step's target.
///
/// `Equals` is exact when `tolerance` is 0.0. `Contains` never holds for
/// numbers.
pub fn satisfies_number(recognized: f64, target: f64, comparison: Comparison, tolerance: f64) -> bool {
    match comparison {
        Comparison::LessThan => recognized < target,
        Comparison::Equals if tolerance > 0.0 => (recognized - target).abs() <= tolerance,
        Comparison::Equals => recognized == target,
        Comparison::Contains => false,
    }
}

/// Case-insensitive substring match.
pub fn contains_text(recognized: &str, target: &str) -> bool {
    recognized.to_lowercase().contains(&target.to_lowercase())
}
