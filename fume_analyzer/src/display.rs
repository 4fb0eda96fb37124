// Live view of the intermediate frames for `--debug`. Pressing `q` in any window
// stops the run; frames analysed so far still produce a result.

use crate::video::{frame_to_bgr, gray_to_mat};
use fume_vision::classifier::Classification;
use fume_vision::pipeline::FrameObserver;
use fume_vision::subtractor::SubtractedFrame;
use opencv::highgui;
use std::ops::ControlFlow;
use tracing::{info, warn};

const QUIT_KEY: i32 = 'q' as i32;

#[derive(Debug, Default)]
pub struct HighGuiObserver {
    display_failed: bool,
}

impl HighGuiObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits briefly for a key press after `shown` frames were drawn.
    fn poll(&mut self, shown: opencv::Result<()>) -> ControlFlow<()> {
        match shown.and_then(|()| highgui::wait_key(1)) {
            Ok(key) if key & 0xFF == QUIT_KEY => {
                info!("Stopped from the debug display.");
                ControlFlow::Break(())
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(error) => {
                // Display errors never abort the analysis; report the first one only.
                if !self.display_failed {
                    warn!("Debug display failed: {}", error);
                    self.display_failed = true;
                }
                ControlFlow::Continue(())
            }
        }
    }
}

impl FrameObserver for HighGuiObserver {
    fn on_subtracted(&mut self, frame: &SubtractedFrame) -> ControlFlow<()> {
        let shown = (|| {
            highgui::imshow("Frame", &frame_to_bgr(&frame.rescaled)?)?;
            highgui::imshow("diff", &gray_to_mat(frame.difference.as_image())?)?;
            highgui::imshow("mask", &frame_to_bgr(&frame.masked)?)
        })();
        self.poll(shown)
    }

    fn on_classified(&mut self, _index: u64, classification: &Classification) -> ControlFlow<()> {
        let shown = frame_to_bgr(&classification.output)
            .and_then(|output| highgui::imshow("img", &output));
        self.poll(shown)
    }
}

impl Drop for HighGuiObserver {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}
