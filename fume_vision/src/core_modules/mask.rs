// THEORY:
// A `BinaryMask` is a single-channel grid with the same geometry as a frame where
// every element is either off (0) or on (255). Both stages of the pipeline speak
// in masks:
// - the background subtractor thresholds the difference between the reference
//   frame and a live frame into a `DifferenceMask`;
// - the colour classifier builds one mask per hue band and unions them.
//
// Union is an arithmetic sum of the two masks with saturation, so a pixel claimed
// by two overlapping bands stays "on" instead of wrapping around to a small value.
// Applying a mask to a colour frame zeroes every channel of every "off" pixel.

use crate::core_modules::frame::{Frame, Geometry};
use image::{GrayImage, Luma, Rgb};

/// Value stored for a set element.
pub const MASK_ON: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

/// Changed/unchanged flags produced by background subtraction.
pub type DifferenceMask = BinaryMask;

impl BinaryMask {
    pub fn from_fn(geometry: Geometry, is_set: impl Fn(u32, u32) -> bool) -> Self {
        let image = GrayImage::from_fn(geometry.width, geometry.height, |x, y| {
            Luma([if is_set(x, y) { MASK_ON } else { 0 }])
        });
        Self { image }
    }

    /// Thresholds `|reference - live| >= threshold` per pixel.
    ///
    /// Both images must share a geometry.
    pub fn difference(reference: &GrayImage, live: &GrayImage, threshold: u8) -> Self {
        debug_assert_eq!(reference.dimensions(), live.dimensions());
        let mut image = GrayImage::new(live.width(), live.height());
        for ((target, before), after) in image
            .iter_mut()
            .zip(reference.iter())
            .zip(live.iter())
        {
            if before.abs_diff(*after) >= threshold {
                *target = MASK_ON;
            }
        }
        Self { image }
    }

    /// Saturating sum of two masks of the same geometry.
    pub fn union(&self, other: &BinaryMask) -> Self {
        debug_assert_eq!(self.geometry(), other.geometry());
        let mut image = self.image.clone();
        for (target, addend) in image.iter_mut().zip(other.image.iter()) {
            *target = target.saturating_add(*addend);
        }
        Self { image }
    }

    /// Copy of `frame` with every pixel outside the mask zeroed.
    pub fn apply(&self, frame: &Frame) -> Frame {
        debug_assert_eq!(Geometry::of(frame), self.geometry());
        let mut masked = frame.clone();
        for (pixel, flag) in masked.pixels_mut().zip(self.image.iter()) {
            if *flag == 0 {
                *pixel = Rgb([0, 0, 0]);
            }
        }
        masked
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    /// Number of set elements.
    pub fn count(&self) -> u64 {
        self.image.iter().filter(|flag| **flag != 0).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.image.iter().all(|flag| *flag == 0)
    }

    pub fn is_full(&self) -> bool {
        self.image.iter().all(|flag| *flag != 0)
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::of(&self.image)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}
