// THEORY:
// Decoders can hang. `TimedSource` moves the real source onto its own reader
// thread and hands frames over a small bounded channel; the consumer waits for
// each frame with a deadline. A missed deadline closes the stream with
// `DecodeTimeout`, which the pipeline treats like any other mid-stream decode
// failure. The reader thread is detached: if the decoder never returns, the
// thread stays blocked but the analysis run is no longer tied to it.
//
// The source is also *opened* on the reader thread, so a container that hangs
// while probing is caught by the same deadline.

use crate::core_modules::frame::{Frame, Geometry};
use crate::error::FumeError;
use crate::source::FrameSource;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Frames decoded ahead of the consumer.
const READ_AHEAD: usize = 4;

enum ReaderEvent {
    Opened(Option<Geometry>),
    OpenFailed(FumeError),
    Read(Result<Option<Frame>, FumeError>),
}

pub struct TimedSource {
    events: Receiver<ReaderEvent>,
    geometry: Option<Geometry>,
    timeout: Duration,
    closed: bool,
}

impl TimedSource {
    /// Runs `open` on a reader thread and waits up to `timeout` for it to finish.
    pub fn spawn<F, S>(path: &Path, timeout: Duration, open: F) -> Result<Self, FumeError>
    where
        F: FnOnce() -> Result<S, FumeError> + Send + 'static,
        S: FrameSource + 'static,
    {
        let (sender, events) = bounded(READ_AHEAD);
        let label: PathBuf = path.to_path_buf();

        thread::Builder::new()
            .name("fume-reader".into())
            .spawn(move || {
                let mut source = match open() {
                    Ok(source) => source,
                    Err(error) => {
                        let _ = sender.send(ReaderEvent::OpenFailed(error));
                        return;
                    }
                };
                if sender.send(ReaderEvent::Opened(source.geometry())).is_err() {
                    return;
                }
                loop {
                    let read = source.next_frame();
                    let last = !matches!(read, Ok(Some(_)));
                    if sender.send(ReaderEvent::Read(read)).is_err() || last {
                        break;
                    }
                }
                debug!("Reader thread finished.");
            })
            .map_err(|error| FumeError::source_unavailable(&label, error))?;

        match events.recv_timeout(timeout) {
            Ok(ReaderEvent::Opened(geometry)) => Ok(Self {
                events,
                geometry,
                timeout,
                closed: false,
            }),
            Ok(ReaderEvent::OpenFailed(error)) => Err(error),
            Ok(ReaderEvent::Read(_)) => Err(FumeError::source_unavailable(
                &label,
                "reader produced frames before opening",
            )),
            Err(RecvTimeoutError::Timeout) => Err(FumeError::source_unavailable(
                &label,
                format!("opening did not finish within {timeout:?}"),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(FumeError::source_unavailable(
                &label,
                "reader thread exited while opening",
            )),
        }
    }
}

impl FrameSource for TimedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FumeError> {
        if self.closed {
            return Ok(None);
        }
        let read = match self.events.recv_timeout(self.timeout) {
            Ok(ReaderEvent::Read(read)) => read,
            Ok(_) => Err(FumeError::TransientDecode("unexpected reader event".into())),
            Err(RecvTimeoutError::Timeout) => Err(FumeError::DecodeTimeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FumeError::TransientDecode("reader thread exited".into()))
            }
        };
        match &read {
            Ok(Some(frame)) => {
                if self.geometry.is_none() {
                    self.geometry = Some(Geometry::of(frame));
                }
            }
            _ => self.closed = true,
        }
        read
    }

    fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }
}
