// THEORY:
// A hue band is an inclusive box in 8-bit HSV space: a hue interval plus floors
// (and ceilings) on saturation and value. A pixel belongs to the band when all
// three of its components fall inside their intervals.
//
// Toxic fumes are described by two bands. The low band starts at hue 0; the high
// band sits just below the wrap point and its upper hue bound (200) lies past the
// largest hue a pixel can have (179), so everything from 160 up to the wrap is
// covered. The two defaults do not overlap; if a configuration makes them
// overlap, the mask union in `mask` clamps instead of wrapping.

use crate::core_modules::frame::{Frame, Geometry};
use crate::core_modules::mask::BinaryMask;
use crate::core_modules::pixel::pixel::HsvPixel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HueBand {
    pub hue_min: u8,
    pub hue_max: u8,
    pub saturation_min: u8,
    pub saturation_max: u8,
    pub value_min: u8,
    pub value_max: u8,
}

impl HueBand {
    /// Reds, oranges and yellows starting at the wrap point.
    pub const LOW: HueBand = HueBand {
        hue_min: 0,
        hue_max: 60,
        saturation_min: 50,
        saturation_max: 255,
        value_min: 50,
        value_max: 255,
    };

    /// Magenta-reds just below the wrap point.
    pub const HIGH: HueBand = HueBand {
        hue_min: 160,
        hue_max: 200,
        saturation_min: 50,
        saturation_max: 255,
        value_min: 50,
        value_max: 255,
    };

    pub fn contains(&self, pixel: HsvPixel) -> bool {
        (self.hue_min..=self.hue_max).contains(&pixel.hue)
            && (self.saturation_min..=self.saturation_max).contains(&pixel.saturation)
            && (self.value_min..=self.value_max).contains(&pixel.value)
    }

    pub fn mask(&self, frame: &HsvFrame) -> BinaryMask {
        BinaryMask::from_fn(frame.geometry, |x, y| self.contains(frame.get(x, y)))
    }

    /// Every lower bound is at most its upper bound.
    pub fn is_well_formed(&self) -> bool {
        self.hue_min <= self.hue_max
            && self.saturation_min <= self.saturation_max
            && self.value_min <= self.value_max
    }

    pub fn overlaps(&self, other: &HueBand) -> bool {
        fn intersects(a: (u8, u8), b: (u8, u8)) -> bool {
            a.0 <= b.1 && b.0 <= a.1
        }
        intersects((self.hue_min, self.hue_max), (other.hue_min, other.hue_max))
            && intersects(
                (self.saturation_min, self.saturation_max),
                (other.saturation_min, other.saturation_max),
            )
            && intersects(
                (self.value_min, self.value_max),
                (other.value_min, other.value_max),
            )
    }
}

/// A frame converted once to HSV so several bands can be tested against it.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    geometry: Geometry,
    pixels: Vec<HsvPixel>,
}

impl HsvFrame {
    pub fn from_rgb(frame: &Frame) -> Self {
        Self {
            geometry: Geometry::of(frame),
            pixels: frame.pixels().map(HsvPixel::from).collect(),
        }
    }

    pub fn get(&self, x: u32, y: u32) -> HsvPixel {
        self.pixels[(y * self.geometry.width + x) as usize]
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
}
