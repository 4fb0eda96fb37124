// THEORY:
// The `BackgroundSubtractor` is the first stage of the fume analysis. It isolates
// whatever moved relative to the very first frame of the video.
//
// Algorithm:
// 1.  **Reference capture**: the first frame is rescaled, converted to luma and
//     smoothed with the 5x5 Gaussian. That grayscale image is the reference for
//     the whole run and is never refreshed.
// 2.  **Differencing**: every later frame goes through the same rescale, luma and
//     blur steps; the absolute per-pixel difference against the reference is
//     thresholded into a `DifferenceMask`.
// 3.  **Colour masking**: the mask is applied to the rescaled *colour* frame, so
//     the output keeps the original colours of the changed pixels and is black
//     everywhere else.
//
// The subtractor is an iterator that pulls one frame at a time from its source;
// only the reference frame is held between frames. The reference frame itself is
// consumed, so N input frames yield at most N - 1 masked frames.
//
// Decode failures and timeouts end the iteration quietly. Any other source error
// also ends it, but is kept so the caller can fail the run (`take_failure`).
//
// Known limitation: the static reference assumes a static camera. Camera motion
// after the first frame is indistinguishable from real foreground motion.

use crate::config::FumeConfig;
use crate::core_modules::frame::{Frame, Geometry, rescale, to_grayscale};
use crate::core_modules::gaussian::gaussian_blur_5x5;
use crate::core_modules::mask::DifferenceMask;
use crate::error::FumeError;
use crate::source::{FrameSource, StreamEnd};
use image::GrayImage;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtractorSettings {
    pub resize_percent: u32,
    pub diff_threshold: u8,
}

impl Default for SubtractorSettings {
    fn default() -> Self {
        Self {
            resize_percent: 100,
            diff_threshold: 20,
        }
    }
}

impl From<&FumeConfig> for SubtractorSettings {
    fn from(config: &FumeConfig) -> Self {
        Self {
            resize_percent: config.resize_percent,
            diff_threshold: config.diff_threshold,
        }
    }
}

/// Everything the subtractor derived from one live frame.
#[derive(Debug, Clone)]
pub struct SubtractedFrame {
    /// Zero-based position among the emitted frames (the reference is not counted).
    pub index: u64,
    /// The live frame after rescaling.
    pub rescaled: Frame,
    pub difference: DifferenceMask,
    /// `rescaled` with every unchanged pixel zeroed.
    pub masked: Frame,
}

pub struct BackgroundSubtractor<S> {
    source: S,
    settings: SubtractorSettings,
    reference: GrayImage,
    geometry: Geometry,
    emitted: u64,
    end: Option<StreamEnd>,
    failure: Option<FumeError>,
}

impl<S: FrameSource> BackgroundSubtractor<S> {
    /// Reads the reference frame from `source`.
    ///
    /// A source with no frames at all is `SourceUnavailable`; a source whose first
    /// frame cannot be decoded is `EmptyStream`. Other read errors are returned as is.
    pub fn new(
        mut source: S,
        settings: SubtractorSettings,
        path: &Path,
    ) -> Result<Self, FumeError> {
        let first = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(FumeError::source_unavailable(path, "contains no frames")),
            Err(error) if !error.is_recoverable() => return Err(error),
            Err(error) => {
                warn!("Reference frame could not be decoded: {}", error);
                return Err(FumeError::EmptyStream);
            }
        };

        let rescaled = rescale(first, settings.resize_percent);
        let geometry = Geometry::of(&rescaled);
        let reference = smooth_luma(&rescaled);
        debug!(
            width = geometry.width,
            height = geometry.height,
            "Captured reference frame."
        );

        Ok(Self {
            source,
            settings,
            reference,
            geometry,
            emitted: 0,
            end: None,
            failure: None,
        })
    }

    /// Geometry of the reference frame, shared by every emitted frame.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Why the stream stopped, once it has.
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// The unrecoverable source error that ended the stream, if any.
    pub fn take_failure(&mut self) -> Option<FumeError> {
        self.failure.take()
    }

    /// Differences one live frame against the reference.
    pub fn subtract(&self, frame: Frame) -> Result<(Frame, DifferenceMask, Frame), FumeError> {
        let rescaled = rescale(frame, self.settings.resize_percent);
        if Geometry::of(&rescaled) != self.geometry {
            return Err(FumeError::TransientDecode(format!(
                "frame geometry {:?} differs from reference {:?}",
                Geometry::of(&rescaled),
                self.geometry
            )));
        }
        let difference = DifferenceMask::difference(
            &self.reference,
            &smooth_luma(&rescaled),
            self.settings.diff_threshold,
        );
        let masked = difference.apply(&rescaled);
        Ok((rescaled, difference, masked))
    }

    fn fail(&mut self, error: FumeError) {
        if error.is_recoverable() {
            self.close(StreamEnd::from_error(&error));
        } else {
            self.end = Some(StreamEnd::from_error(&error));
            self.failure = Some(error);
        }
    }

    fn close(&mut self, end: StreamEnd) {
        if let StreamEnd::DecodeFailed(reason) = &end {
            warn!(
                frames = self.emitted,
                "Stream ended early on a decode failure: {}", reason
            );
        } else if end == StreamEnd::TimedOut {
            warn!(frames = self.emitted, "Stream ended early: frame read timed out.");
        }
        self.end = Some(end);
    }
}

impl<S: FrameSource> Iterator for BackgroundSubtractor<S> {
    type Item = SubtractedFrame;

    fn next(&mut self) -> Option<SubtractedFrame> {
        if self.end.is_some() {
            return None;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.close(StreamEnd::Exhausted);
                return None;
            }
            Err(error) => {
                self.fail(error);
                return None;
            }
        };

        match self.subtract(frame) {
            Ok((rescaled, difference, masked)) => {
                let index = self.emitted;
                self.emitted += 1;
                debug!(index, changed = difference.count(), "Subtracted frame.");
                Some(SubtractedFrame {
                    index,
                    rescaled,
                    difference,
                    masked,
                })
            }
            Err(error) => {
                self.fail(error);
                None
            }
        }
    }
}

fn smooth_luma(frame: &Frame) -> GrayImage {
    gaussian_blur_5x5(&to_grayscale(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryBackend, MemorySource};
    use crate::source::VideoBackend;
    use image::Rgb;

    fn open(
        frames: Vec<Frame>,
        fault: Option<Fault>,
    ) -> Result<BackgroundSubtractor<MemorySource>, FumeError> {
        let backend = MemoryBackend::new();
        match fault {
            Some(fault) => backend.insert_with_fault("clip", frames, fault),
            None => backend.insert("clip", frames),
        }
        let source = backend.open(Path::new("clip"))?;
        BackgroundSubtractor::new(source, SubtractorSettings::default(), Path::new("clip"))
    }

    fn textured(width: u32, height: u32) -> Frame {
        Frame::from_fn(width, height, |x, y| {
            Rgb([(x * 13 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8])
        })
    }

    #[test]
    fn static_scene_produces_empty_masks() {
        let subtractor = open(vec![textured(16, 12); 5], None).unwrap();
        let frames: Vec<_> = subtractor.collect();
        assert_eq!(frames.len(), 4);
        for frame in &frames {
            assert!(frame.difference.is_empty());
            assert!(frame.masked.pixels().all(|pixel| pixel.0 == [0, 0, 0]));
        }
    }

    #[test]
    fn full_scene_change_sets_every_pixel() {
        let black = Frame::new(12, 10);
        let red = Frame::from_pixel(12, 10, Rgb([255, 0, 0]));
        let mut subtractor = open(vec![black, red.clone()], None).unwrap();
        let frame = subtractor.next().expect("one masked frame");
        assert!(frame.difference.is_full());
        assert_eq!(frame.masked, red);
        assert!(subtractor.next().is_none());
        assert_eq!(subtractor.end(), Some(&StreamEnd::Exhausted));
    }

    #[test]
    fn only_the_moving_region_survives() {
        let reference = Frame::new(20, 20);
        let mut live = reference.clone();
        for y in 6..14 {
            for x in 6..14 {
                live.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let mut subtractor = open(vec![reference, live], None).unwrap();
        let frame = subtractor.next().unwrap();
        assert!(frame.difference.is_set(10, 10));
        assert!(!frame.difference.is_set(0, 0));
        assert!(!frame.difference.is_set(19, 19));
        assert_eq!(frame.masked.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn empty_source_is_unavailable() {
        let result = open(Vec::new(), None);
        assert!(matches!(result, Err(FumeError::SourceUnavailable { .. })));
    }

    #[test]
    fn undecodable_first_frame_is_an_empty_stream() {
        let result = open(vec![textured(8, 8); 3], Some(Fault::DecodeErrorAt(0)));
        assert!(matches!(result, Err(FumeError::EmptyStream)));
    }

    #[test]
    fn decode_failure_ends_the_stream_gracefully() {
        let mut subtractor = open(vec![textured(8, 8); 5], Some(Fault::DecodeErrorAt(2))).unwrap();
        assert!(subtractor.next().is_some());
        assert!(subtractor.next().is_none());
        assert!(subtractor.next().is_none());
        assert!(matches!(subtractor.end(), Some(StreamEnd::DecodeFailed(_))));
        assert_eq!(subtractor.emitted(), 1);
    }

    #[test]
    fn read_error_is_kept_for_the_caller() {
        let mut subtractor = open(vec![textured(8, 8); 5], Some(Fault::ReadErrorAt(2))).unwrap();
        assert!(subtractor.next().is_some());
        assert!(subtractor.next().is_none());
        assert!(subtractor.next().is_none());
        assert!(matches!(subtractor.take_failure(), Some(FumeError::SourceIo { .. })));
        assert!(subtractor.take_failure().is_none());
    }

    #[test]
    fn decode_failures_leave_nothing_to_take() {
        let mut subtractor = open(vec![textured(8, 8); 5], Some(Fault::DecodeErrorAt(2))).unwrap();
        while subtractor.next().is_some() {}
        assert!(subtractor.take_failure().is_none());
    }

    #[test]
    fn read_error_on_the_reference_frame_is_returned() {
        let result = open(vec![textured(8, 8); 3], Some(Fault::ReadErrorAt(0)));
        assert!(matches!(result, Err(FumeError::SourceIo { .. })));
    }

    #[test]
    fn geometry_change_ends_the_stream() {
        let frames = vec![textured(8, 8), textured(8, 8), textured(10, 8), textured(8, 8)];
        let mut subtractor = open(frames, None).unwrap();
        assert!(subtractor.next().is_some());
        assert!(subtractor.next().is_none());
        assert!(matches!(subtractor.end(), Some(StreamEnd::DecodeFailed(_))));
    }

    #[test]
    fn rescaling_applies_to_reference_and_live_frames() {
        let backend = MemoryBackend::new();
        backend.insert("clip", vec![textured(40, 20); 3]);
        let source = backend.open(Path::new("clip")).unwrap();
        let settings = SubtractorSettings {
            resize_percent: 50,
            ..SubtractorSettings::default()
        };
        let subtractor = BackgroundSubtractor::new(source, settings, Path::new("clip")).unwrap();
        assert_eq!(subtractor.geometry(), Geometry::new(20, 10));
        for frame in subtractor {
            assert_eq!(Geometry::of(&frame.masked), Geometry::new(20, 10));
            assert!(frame.difference.is_empty());
        }
    }
}
