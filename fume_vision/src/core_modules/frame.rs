// THEORY:
// A `Frame` is one decoded RGB picture from the video. The pipeline never edits a
// frame in place: every stage produces a new frame (rescaled, masked, classified)
// so that a debug observer can look at each intermediate result side by side.
//
// This module holds the frame-wide helpers that do not need a neighbourhood:
// geometry, rescaling, grayscale conversion and the "visible pixel" count used as
// the denominator of the toxicity ratio.

use crate::core_modules::pixel::pixel::luma;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// A decoded colour frame, RGB channel order.
pub type Frame = RgbImage;

/// The width and height shared by every frame of one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Target geometry after rescaling by `percent`; sizes truncate and never reach zero.
    pub fn scaled(&self, percent: u32) -> Self {
        let scale = |side: u32| ((side as u64 * percent as u64) / 100).max(1) as u32;
        Self {
            width: scale(self.width),
            height: scale(self.height),
        }
    }
}

/// Rescales a frame by a percentage of its size with nearest-neighbour sampling.
/// 100% hands the frame back untouched.
pub fn rescale(frame: Frame, percent: u32) -> Frame {
    if percent == 100 {
        return frame;
    }
    let target = Geometry::of(&frame).scaled(percent);
    imageops::resize(&frame, target.width, target.height, FilterType::Nearest)
}

/// Single-channel luma version of a colour frame.
pub fn to_grayscale(frame: &Frame) -> GrayImage {
    let mut gray = GrayImage::new(frame.width(), frame.height());
    for (source, target) in frame.pixels().zip(gray.pixels_mut()) {
        let [red, green, blue] = source.0;
        *target = Luma([luma(red, green, blue)]);
    }
    gray
}

/// Number of pixels with at least one non-zero channel.
pub fn visible_pixels(frame: &Frame) -> u64 {
    frame.pixels().filter(|pixel| pixel.0 != [0, 0, 0]).count() as u64
}
