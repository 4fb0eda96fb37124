// THEORY:
// The `ColorClassifier` is the second stage of the fume analysis. It receives the
// background-subtracted frames one at a time and decides which of the surviving
// pixels have the colour of toxic fumes.
//
// Per frame:
// 1.  The frame is converted to HSV once and tested against both hue bands; the
//     two band masks are unioned.
// 2.  The output frame keeps only the pixels inside the union mask.
// 3.  The frame's toxic ratio is (pixels in the union mask) / (pixels with any
//     non-zero channel). Background subtraction blacks out everything that did
//     not move, so the denominator is "what moved". A fully black frame has no
//     denominator and contributes a ratio of zero.
// 4.  The ratio is added to the `ToxicityAccumulator`.
//
// `finalize` consumes the classifier and turns the accumulated ratios into the
// toxicity percentage.

use crate::config::FumeConfig;
use crate::core_modules::accumulator::{FrameCountOrigin, ToxicityAccumulator};
use crate::core_modules::frame::{Frame, visible_pixels};
use crate::core_modules::hue_band::{HsvFrame, HueBand};
use crate::core_modules::mask::BinaryMask;
use tracing::debug;

/// The classifier's verdict on one frame.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The input frame with every non-toxic pixel zeroed.
    pub output: Frame,
    pub toxic_mask: BinaryMask,
    pub toxic_pixels: u64,
    /// Pixels of the input frame with any non-zero channel.
    pub visible_pixels: u64,
    pub ratio: f64,
}

pub struct ColorClassifier {
    low_band: HueBand,
    high_band: HueBand,
    accumulator: ToxicityAccumulator,
}

impl ColorClassifier {
    pub fn new(low_band: HueBand, high_band: HueBand, origin: FrameCountOrigin) -> Self {
        Self {
            low_band,
            high_band,
            accumulator: ToxicityAccumulator::new(origin),
        }
    }

    pub fn from_config(config: &FumeConfig) -> Self {
        Self::new(
            config.hue_band_low,
            config.hue_band_high,
            config.frame_count_origin,
        )
    }

    /// Union of both band masks over `frame`.
    pub fn toxic_mask(&self, frame: &Frame) -> BinaryMask {
        let hsv = HsvFrame::from_rgb(frame);
        self.low_band.mask(&hsv).union(&self.high_band.mask(&hsv))
    }

    /// Classifies one frame and adds its ratio to the running total.
    pub fn classify(&mut self, frame: &Frame) -> Classification {
        let toxic_mask = self.toxic_mask(frame);
        let output = toxic_mask.apply(frame);
        let toxic_pixels = toxic_mask.count();
        let visible_pixels = visible_pixels(frame);
        let ratio = toxic_ratio(toxic_pixels, visible_pixels);

        self.accumulator.add(ratio);
        debug!(
            frame = self.accumulator.measured(),
            toxic_pixels, visible_pixels, ratio, "Classified frame."
        );

        Classification {
            output,
            toxic_mask,
            toxic_pixels,
            visible_pixels,
            ratio,
        }
    }

    /// Frames classified so far.
    pub fn frames_measured(&self) -> u64 {
        self.accumulator.measured()
    }

    /// The toxicity percentage over every classified frame.
    pub fn finalize(self) -> f64 {
        self.accumulator.finalize()
    }
}

/// Toxic share of the visible pixels; zero when nothing is visible.
pub fn toxic_ratio(toxic_pixels: u64, visible_pixels: u64) -> f64 {
    if visible_pixels == 0 {
        return 0.0;
    }
    toxic_pixels as f64 / visible_pixels as f64
}
