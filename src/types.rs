//! Small geometry types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// 2D size in pixels.
///
/// Sizes flow through the scaling algebra as floats and are rounded to whole
/// texels only at texture-allocation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size2 {
    pub x: f32,
    pub y: f32,
}

impl Size2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Rounded pixel dimensions, clamped to at least one texel per axis.
    pub fn to_pixels(self) -> [u32; 2] {
        [
            (self.x.round().max(1.0)) as u32,
            (self.y.round().max(1.0)) as u32,
        ]
    }
}

impl From<[u32; 2]> for Size2 {
    fn from(px: [u32; 2]) -> Self {
        Self::new(px[0] as f32, px[1] as f32)
    }
}

/// A 2D point, used for the four destination corners of the on-screen quad.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in pixels, top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering `size` pixels at the origin.
    pub fn with_size(size: Size2) -> Self {
        Self::new(0.0, 0.0, size.x, size.y)
    }

    pub fn size(&self) -> Size2 {
        Size2::new(self.width, self.height)
    }
}
