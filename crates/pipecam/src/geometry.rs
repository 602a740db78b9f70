// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame size in pixels.
///
/// ```
/// use pipecam::geometry::Size;
///
/// let size = Size::new(640, 480);
/// assert_eq!(size.to_string(), "640x480");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Range of sizes a video node accepts, with alignment steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: Size,
    pub max: Size,
    pub h_step: u32,
    pub v_step: u32,
}

impl SizeRange {
    pub const fn new(min: Size, max: Size, h_step: u32, v_step: u32) -> Self {
        Self {
            min,
            max,
            h_step,
            v_step,
        }
    }

    pub fn contains(&self, size: Size) -> bool {
        self.clamp(size) == size
    }

    /// Nearest size inside the range, rounding down to the step alignment.
    ///
    /// A range whose maximum is below its minimum only contains the minimum.
    pub fn clamp(&self, size: Size) -> Size {
        Size {
            width: clamp_aligned(size.width, self.min.width, self.max.width, self.h_step),
            height: clamp_aligned(size.height, self.min.height, self.max.height, self.v_step),
        }
    }
}

fn clamp_aligned(value: u32, min: u32, max: u32, step: u32) -> u32 {
    let value = value.clamp(min, max.max(min));
    if step <= 1 {
        return value;
    }
    let aligned = min + (value - min) / step * step;
    aligned.max(min)
}
