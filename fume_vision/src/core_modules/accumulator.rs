// Running state of one analysis: the sum of per-frame toxic ratios and the number
// of frame slots they are averaged over. Finalizing consumes the accumulator, so a
// run can only produce its percentage once.

use serde::{Deserialize, Serialize};

/// Where the frame-slot counter starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameCountOrigin {
    /// Average over the frames that were actually classified.
    #[default]
    Measured,
    /// Start the counter at one, reproducing percentages produced by the
    /// historical tool (always diluted by one extra frame slot).
    Legacy,
}

impl FrameCountOrigin {
    fn initial_slots(self) -> u64 {
        match self {
            FrameCountOrigin::Measured => 0,
            FrameCountOrigin::Legacy => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToxicityAccumulator {
    ratio_sum: f64,
    frame_slots: u64,
    measured: u64,
}

impl ToxicityAccumulator {
    pub fn new(origin: FrameCountOrigin) -> Self {
        Self {
            ratio_sum: 0.0,
            frame_slots: origin.initial_slots(),
            measured: 0,
        }
    }

    pub fn add(&mut self, ratio: f64) {
        self.ratio_sum += ratio;
        self.frame_slots += 1;
        self.measured += 1;
    }

    /// Frames that contributed a ratio (black frames included).
    pub fn measured(&self) -> u64 {
        self.measured
    }

    pub fn running_sum(&self) -> f64 {
        self.ratio_sum
    }

    /// Mean ratio over all frame slots, as a percentage. Zero when nothing was added.
    pub fn finalize(self) -> f64 {
        if self.frame_slots == 0 {
            return 0.0;
        }
        self.ratio_sum / self.frame_slots as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_origin_averages_over_classified_frames() {
        let mut accumulator = ToxicityAccumulator::new(FrameCountOrigin::Measured);
        accumulator.add(1.0);
        accumulator.add(0.5);
        accumulator.add(0.0);
        assert_eq!(accumulator.measured(), 3);
        assert_eq!(accumulator.running_sum(), 1.5);
        assert_eq!(accumulator.finalize(), 50.0);
    }

    #[test]
    fn legacy_origin_adds_one_slot() {
        let mut accumulator = ToxicityAccumulator::new(FrameCountOrigin::Legacy);
        accumulator.add(1.0);
        assert_eq!(accumulator.measured(), 1);
        assert_eq!(accumulator.finalize(), 50.0);
    }

    #[test]
    fn empty_accumulator_finalizes_to_zero() {
        assert_eq!(ToxicityAccumulator::new(FrameCountOrigin::Measured).finalize(), 0.0);
        assert_eq!(ToxicityAccumulator::new(FrameCountOrigin::Legacy).finalize(), 0.0);
    }

    #[test]
    fn percentage_is_not_capped() {
        let mut accumulator = ToxicityAccumulator::new(FrameCountOrigin::Measured);
        accumulator.add(1.5);
        assert_eq!(accumulator.finalize(), 150.0);
    }
}
