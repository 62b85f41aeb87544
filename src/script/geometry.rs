//! Screen-space geometry for recognition regions.

use std::fmt;

/// Smallest accepted width/height of a recognition region, in screen units.
pub const MIN_REGION_SIZE: f32 = 50.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("region coordinates must be finite")]
    NotFinite,
    #[error("region is inverted: right ({right}) must exceed left ({left}) and bottom ({bottom}) must exceed top ({top})")]
    Inverted {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },
    #[error("region {width}x{height} is smaller than the {min}x{min} minimum")]
    TooSmall { width: f32, height: f32, min: f32 },
}

/// A rectangle in absolute host-screen coordinates.
///
/// Validated once when authored; consumers (the engine, the capture
/// backend) can rely on `right > left`, `bottom > top` and the minimum size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self, GeometryError> {
        if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
            return Err(GeometryError::NotFinite);
        }
        if right <= left || bottom <= top {
            return Err(GeometryError::Inverted {
                left,
                top,
                right,
                bottom,
            });
        }

        let (width, height) = (right - left, bottom - top);
        if width < MIN_REGION_SIZE || height < MIN_REGION_SIZE {
            return Err(GeometryError::TooSmall {
                width,
                height,
                min: MIN_REGION_SIZE,
            });
        }

        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) -> ({}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}
