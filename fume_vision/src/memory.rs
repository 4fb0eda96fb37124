// An in-memory `VideoBackend`: videos are vectors of frames keyed by path in a
// shared store. Sinks write losslessly into the same store, so a run's artifacts
// can be inspected (or re-opened, in two-pass mode) without touching the disk.
// Stored videos can carry a scripted fault to exercise decode failures and
// stalled reads.

use crate::core_modules::frame::{Frame, Geometry};
use crate::error::FumeError;
use crate::source::{FrameSink, FrameSource, VideoBackend};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A scripted failure, addressed by the zero-based index of the read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// The read at this index fails to decode.
    DecodeErrorAt(usize),
    /// The read at this index fails with an I/O error the run cannot recover from.
    ReadErrorAt(usize),
    /// The read at this index blocks for the given duration before succeeding.
    StallAt(usize, Duration),
}

#[derive(Debug, Clone, Default)]
struct StoredVideo {
    frames: Vec<Frame>,
    frame_rate: Option<f64>,
    fault: Option<Fault>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    videos: Arc<Mutex<HashMap<PathBuf, StoredVideo>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, frames: Vec<Frame>) {
        self.store(path.into(), frames, None);
    }

    pub fn insert_with_fault(&self, path: impl Into<PathBuf>, frames: Vec<Frame>, fault: Fault) {
        self.store(path.into(), frames, Some(fault));
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Copy of every frame stored under `path`.
    pub fn frames(&self, path: &Path) -> Option<Vec<Frame>> {
        self.lock().get(path).map(|video| video.frames.clone())
    }

    /// Frame rate recorded when the video was created by a sink.
    pub fn frame_rate(&self, path: &Path) -> Option<f64> {
        self.lock().get(path).and_then(|video| video.frame_rate)
    }

    fn store(&self, path: PathBuf, frames: Vec<Frame>, fault: Option<Fault>) {
        self.lock().insert(
            path,
            StoredVideo {
                frames,
                frame_rate: None,
                fault,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, StoredVideo>> {
        self.videos.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoBackend for MemoryBackend {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn open(&self, path: &Path) -> Result<MemorySource, FumeError> {
        let videos = self.lock();
        let video = videos
            .get(path)
            .ok_or_else(|| FumeError::source_unavailable(path, "no such video"))?;
        Ok(MemorySource {
            path: path.to_path_buf(),
            frames: video.frames.iter().cloned().collect(),
            fault: video.fault,
            reads: 0,
            geometry: None,
            closed: false,
        })
    }

    fn create(
        &self,
        path: &Path,
        geometry: Geometry,
        frame_rate: f64,
    ) -> Result<MemorySink, FumeError> {
        self.lock().insert(
            path.to_path_buf(),
            StoredVideo {
                frames: Vec::new(),
                frame_rate: Some(frame_rate),
                fault: None,
            },
        );
        Ok(MemorySink {
            path: path.to_path_buf(),
            geometry,
            videos: Arc::clone(&self.videos),
        })
    }
}

pub struct MemorySource {
    path: PathBuf,
    frames: VecDeque<Frame>,
    fault: Option<Fault>,
    reads: usize,
    geometry: Option<Geometry>,
    closed: bool,
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FumeError> {
        if self.closed {
            return Ok(None);
        }
        let index = self.reads;
        self.reads += 1;

        match self.fault {
            Some(Fault::DecodeErrorAt(at)) if at == index => {
                self.closed = true;
                return Err(FumeError::TransientDecode(format!(
                    "scripted decode failure at frame {index}"
                )));
            }
            Some(Fault::ReadErrorAt(at)) if at == index => {
                self.closed = true;
                let reason = format!("scripted read failure at frame {index}");
                return Err(FumeError::SourceIo {
                    path: self.path.clone(),
                    source: std::io::Error::other(reason),
                });
            }
            Some(Fault::StallAt(at, delay)) if at == index => std::thread::sleep(delay),
            _ => {}
        }

        match self.frames.pop_front() {
            Some(frame) => {
                self.geometry.get_or_insert_with(|| Geometry::of(&frame));
                Ok(Some(frame))
            }
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }
}

pub struct MemorySink {
    path: PathBuf,
    geometry: Geometry,
    videos: Arc<Mutex<HashMap<PathBuf, StoredVideo>>>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<(), FumeError> {
        if Geometry::of(frame) != self.geometry {
            return Err(FumeError::artifact_write(
                &self.path,
                format!(
                    "frame is {:?}, artifact expects {:?}",
                    Geometry::of(frame),
                    self.geometry
                ),
            ));
        }
        let mut videos = self.videos.lock().unwrap_or_else(PoisonError::into_inner);
        videos
            .entry(self.path.clone())
            .or_default()
            .frames
            .push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frames(count: u8) -> Vec<Frame> {
        (0..count)
            .map(|level| Frame::from_pixel(3, 2, Rgb([level; 3])))
            .collect()
    }

    #[test]
    fn source_reads_every_frame_then_ends() {
        let backend = MemoryBackend::new();
        backend.insert("clip", frames(2));
        let mut source = backend.open(Path::new("clip")).unwrap();
        assert_eq!(source.geometry(), None);
        assert!(source.next_frame().unwrap().is_some());
        assert_eq!(source.geometry(), Some(Geometry::new(3, 2)));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn unknown_path_is_unavailable() {
        let backend = MemoryBackend::new();
        let result = backend.open(Path::new("nowhere"));
        assert!(matches!(result, Err(FumeError::SourceUnavailable { .. })));
    }

    #[test]
    fn scripted_decode_failure_closes_the_stream() {
        let backend = MemoryBackend::new();
        backend.insert_with_fault("clip", frames(4), Fault::DecodeErrorAt(1));
        let mut source = backend.open(Path::new("clip")).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(
            source.next_frame(),
            Err(FumeError::TransientDecode(_))
        ));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn scripted_read_failure_is_not_recoverable() {
        let backend = MemoryBackend::new();
        backend.insert_with_fault("clip", frames(3), Fault::ReadErrorAt(1));
        let mut source = backend.open(Path::new("clip")).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        let error = source.next_frame().unwrap_err();
        assert!(matches!(error, FumeError::SourceIo { .. }));
        assert!(!error.is_recoverable());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn create_overwrites_previous_artifact() {
        let backend = MemoryBackend::new();
        backend.insert("out.avi", frames(3));
        let mut sink = backend
            .create(Path::new("out.avi"), Geometry::new(3, 2), 30.0)
            .unwrap();
        assert_eq!(backend.frames(Path::new("out.avi")).unwrap().len(), 0);
        sink.write(&frames(1)[0]).unwrap();
        assert_eq!(backend.frames(Path::new("out.avi")).unwrap().len(), 1);
        assert_eq!(backend.frame_rate(Path::new("out.avi")), Some(30.0));
    }

    #[test]
    fn sink_rejects_frames_of_another_geometry() {
        let backend = MemoryBackend::new();
        let mut sink = backend
            .create(Path::new("out.avi"), Geometry::new(8, 8), 30.0)
            .unwrap();
        let result = sink.write(&frames(1)[0]);
        assert!(matches!(result, Err(FumeError::ArtifactWrite { .. })));
    }
}
