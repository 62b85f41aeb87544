//! Screen-region recognition: image enhancement, number extraction and the
//! staged cascade that ties them to the capture and OCR capabilities.

pub mod cascade;
pub mod extract;
pub mod preprocess;

pub use cascade::{RecognitionCascade, RecognitionOutcome, Recognized};
pub use extract::{contains_text, correct_ocr_errors, is_valid_number, satisfies_number, NumberParser};
