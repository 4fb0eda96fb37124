// THEORY:
// The analysis never talks to a codec directly. A `VideoBackend` opens containers
// as `FrameSource`s and creates artifact files as `FrameSink`s; the pipeline is
// generic over the backend so the same algorithm runs against OpenCV in the CLI
// and against in-memory videos in tests.
//
// A frame read has three outcomes, kept apart on purpose:
// - `Ok(Some(frame))`: the next frame;
// - `Ok(None)`: the container is exhausted (the ordinary end of the sequence);
// - `Err(..)`: the frame could not be decoded. The stream is closed afterwards.
// Sources are single-pass: once they return `Ok(None)` or an error, every later
// call returns `Ok(None)`.

use crate::core_modules::frame::{Frame, Geometry};
use crate::error::FumeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FumeError>;

    /// Frame width and height, once the source knows them.
    fn geometry(&self) -> Option<Geometry>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, FumeError> {
        (**self).next_frame()
    }

    fn geometry(&self) -> Option<Geometry> {
        (**self).geometry()
    }
}

pub trait FrameSink {
    /// Appends one frame. Failures are fatal for the run.
    fn write(&mut self, frame: &Frame) -> Result<(), FumeError>;

    /// Flushes and closes the artifact.
    fn finish(&mut self) -> Result<(), FumeError> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write(&mut self, frame: &Frame) -> Result<(), FumeError> {
        (**self).write(frame)
    }

    fn finish(&mut self) -> Result<(), FumeError> {
        (**self).finish()
    }
}

pub trait VideoBackend {
    type Source: FrameSource + 'static;
    type Sink: FrameSink;

    /// Opens a container for reading. Fails with `SourceUnavailable`.
    fn open(&self, path: &Path) -> Result<Self::Source, FumeError>;

    /// Creates (or truncates) an artifact video of the given geometry.
    fn create(
        &self,
        path: &Path,
        geometry: Geometry,
        frame_rate: f64,
    ) -> Result<Self::Sink, FumeError>;
}

/// Why a frame stream stopped producing frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum StreamEnd {
    /// Every frame in the container was read.
    Exhausted,
    /// A frame failed to decode; earlier frames were kept.
    DecodeFailed(String),
    /// A frame read exceeded the read timeout; earlier frames were kept.
    TimedOut,
    /// A frame observer asked the run to stop.
    Stopped,
}

impl StreamEnd {
    pub fn from_error(error: &FumeError) -> Self {
        match error {
            FumeError::DecodeTimeout(_) => StreamEnd::TimedOut,
            other => StreamEnd::DecodeFailed(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEnd::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_map_to_timed_out() {
        let end = StreamEnd::from_error(&FumeError::DecodeTimeout(Duration::from_millis(10)));
        assert_eq!(end, StreamEnd::TimedOut);
        assert!(!end.is_complete());
    }

    #[test]
    fn decode_errors_keep_their_message() {
        let end = StreamEnd::from_error(&FumeError::TransientDecode("corrupt slice".into()));
        match end {
            StreamEnd::DecodeFailed(message) => assert!(message.contains("corrupt slice")),
            other => panic!("unexpected stream end {other:?}"),
        }
    }
}
