// THEORY:
// The `pipeline` module is the top-level API of the fume analysis. Given a video
// path it runs the `BackgroundSubtractor` and the `ColorClassifier` to completion
// and returns one `AnalysisResult`.
//
// Two chaining modes exist (see `PipelineMode`):
// - **Streaming**: each masked frame goes straight from the subtractor to the
//   classifier. The masked artifact is still written frame by frame.
// - **TwoPass**: the subtractor runs to completion and its artifact is finished,
//   then the artifact is re-opened through the backend and classified.
// With a lossless backend both modes produce the same percentage.
//
// Failure policy: anything before the first compared frame is fatal
// (`SourceUnavailable`, `EmptyStream`), as is any artifact write failure and any
// read error that is not a decode failure. A decode failure or timeout later in
// the stream only ends it; everything accumulated so far is kept and the reason
// is reported in `AnalysisResult::termination`. Artifact files are only created
// once there is a compared frame to write.

use crate::classifier::{Classification, ColorClassifier};
use crate::config::{ArtifactPaths, FumeConfig, PipelineMode};
use crate::core_modules::frame::Geometry;
use crate::error::FumeError;
use crate::source::{FrameSink, FrameSource, StreamEnd, VideoBackend};
use crate::subtractor::{BackgroundSubtractor, SubtractedFrame, SubtractorSettings};
use crate::watchdog::TimedSource;
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{info, warn};

/// Receives every intermediate frame of a run, e.g. to display it.
///
/// Returning `ControlFlow::Break` stops the run after the current frame; the
/// result then reports `StreamEnd::Stopped`.
pub trait FrameObserver {
    fn on_subtracted(&mut self, _frame: &SubtractedFrame) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_classified(&mut self, _index: u64, _classification: &Classification) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FrameObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub toxicity_percentage: f64,
    /// Frames that went through the classifier.
    pub frames_analyzed: u64,
    pub termination: StreamEnd,
    pub artifacts: ArtifactPaths,
}

pub struct FumeAnalysisPipeline<B> {
    backend: B,
    config: FumeConfig,
}

impl<B> FumeAnalysisPipeline<B>
where
    B: VideoBackend + Clone + Send + 'static,
{
    pub fn new(backend: B, config: FumeConfig) -> Result<Self, FumeError> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &FumeConfig {
        &self.config
    }

    pub fn analyze(&self, path: &Path) -> Result<AnalysisResult, FumeError> {
        self.analyze_with(path, &mut NoopObserver)
    }

    pub fn analyze_with(
        &self,
        path: &Path,
        observer: &mut dyn FrameObserver,
    ) -> Result<AnalysisResult, FumeError> {
        info!(
            path = %path.display(),
            mode = ?self.config.mode,
            "Starting fume analysis."
        );

        let result = match self.config.mode {
            PipelineMode::Streaming => self.run_streaming(path, observer)?,
            PipelineMode::TwoPass => self.run_two_pass(path, observer)?,
        };

        info!(
            path = %path.display(),
            frames = result.frames_analyzed,
            termination = ?result.termination,
            "Toxicity percentage: {:.4}",
            result.toxicity_percentage
        );
        Ok(result)
    }

    fn run_streaming(
        &self,
        path: &Path,
        observer: &mut dyn FrameObserver,
    ) -> Result<AnalysisResult, FumeError> {
        let mut subtractor = self.subtractor(path)?;
        let geometry = subtractor.geometry();
        let mut frames = subtractor.by_ref().peekable();
        if frames.peek().is_none() {
            drop(frames);
            return Err(subtractor.take_failure().unwrap_or(FumeError::EmptyStream));
        }

        let artifacts = &self.config.artifacts;
        let mut masked_sink = self.create_sink(&artifacts.masked_video, geometry)?;
        let mut classified_sink = self.create_sink(&artifacts.classified_video, geometry)?;
        let mut classifier = ColorClassifier::from_config(&self.config);
        let mut stopped = false;

        for frame in frames {
            masked_sink.write(&frame.masked)?;
            let subtracted_flow = observer.on_subtracted(&frame);

            let classification = classifier.classify(&frame.masked);
            classified_sink.write(&classification.output)?;
            let classified_flow = observer.on_classified(frame.index, &classification);

            if subtracted_flow.is_break() || classified_flow.is_break() {
                stopped = true;
                break;
            }
        }

        if let Some(error) = subtractor.take_failure() {
            return Err(error);
        }
        masked_sink.finish()?;
        classified_sink.finish()?;

        let termination = if stopped {
            StreamEnd::Stopped
        } else {
            subtractor.end().cloned().unwrap_or(StreamEnd::Exhausted)
        };
        Ok(self.result(classifier, termination))
    }

    fn run_two_pass(
        &self,
        path: &Path,
        observer: &mut dyn FrameObserver,
    ) -> Result<AnalysisResult, FumeError> {
        let artifacts = &self.config.artifacts;

        // Stage 1: subtract and materialise the masked artifact.
        let mut subtractor = self.subtractor(path)?;
        let geometry = subtractor.geometry();
        let mut frames = subtractor.by_ref().peekable();
        if frames.peek().is_none() {
            drop(frames);
            return Err(subtractor.take_failure().unwrap_or(FumeError::EmptyStream));
        }

        let mut masked_sink = self.create_sink(&artifacts.masked_video, geometry)?;
        let mut stopped = false;
        for frame in frames {
            masked_sink.write(&frame.masked)?;
            if observer.on_subtracted(&frame).is_break() {
                stopped = true;
                break;
            }
        }
        if let Some(error) = subtractor.take_failure() {
            return Err(error);
        }
        masked_sink.finish()?;

        let stage_one_end = if stopped {
            StreamEnd::Stopped
        } else {
            subtractor.end().cloned().unwrap_or(StreamEnd::Exhausted)
        };
        info!(
            frames = subtractor.emitted(),
            artifact = %artifacts.masked_video.display(),
            "Masked artifact written, classifying it."
        );

        // Stage 2: re-read the artifact and classify it.
        let mut masked = self.open_source(&artifacts.masked_video)?;
        let mut classified_sink = None;
        let mut classifier = ColorClassifier::from_config(&self.config);
        let mut stage_two_end = StreamEnd::Exhausted;
        let mut index = 0;
        loop {
            let frame = match masked.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(error) if !error.is_recoverable() => return Err(error),
                Err(error) => {
                    warn!(
                        frames = index,
                        "Masked artifact ended early on a read failure: {}", error
                    );
                    stage_two_end = StreamEnd::from_error(&error);
                    break;
                }
            };
            let classification = classifier.classify(&frame);
            if classified_sink.is_none() {
                classified_sink = Some(self.create_sink(&artifacts.classified_video, geometry)?);
            }
            if let Some(sink) = classified_sink.as_mut() {
                sink.write(&classification.output)?;
            }
            let flow = observer.on_classified(index, &classification);
            index += 1;
            if flow.is_break() {
                stage_two_end = StreamEnd::Stopped;
                break;
            }
        }
        if let Some(mut sink) = classified_sink {
            sink.finish()?;
        }

        if classifier.frames_measured() == 0 {
            return Err(FumeError::EmptyStream);
        }
        let termination = if stage_one_end.is_complete() {
            stage_two_end
        } else {
            stage_one_end
        };
        Ok(self.result(classifier, termination))
    }

    fn create_sink(&self, path: &Path, geometry: Geometry) -> Result<B::Sink, FumeError> {
        self.backend.create(path, geometry, self.config.frame_rate)
    }

    fn subtractor(
        &self,
        path: &Path,
    ) -> Result<BackgroundSubtractor<Box<dyn FrameSource>>, FumeError> {
        let source = self.open_source(path)?;
        BackgroundSubtractor::new(source, SubtractorSettings::from(&self.config), path)
    }

    /// Opens `path` through the backend, behind the read watchdog when a timeout is set.
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, FumeError> {
        match self.config.read_timeout() {
            Some(timeout) => {
                let backend = self.backend.clone();
                let owned = path.to_path_buf();
                let source = TimedSource::spawn(path, timeout, move || backend.open(&owned))?;
                Ok(Box::new(source))
            }
            None => Ok(Box::new(self.backend.open(path)?)),
        }
    }

    fn result(&self, classifier: ColorClassifier, termination: StreamEnd) -> AnalysisResult {
        let frames_analyzed = classifier.frames_measured();
        AnalysisResult {
            toxicity_percentage: classifier.finalize(),
            frames_analyzed,
            termination,
            artifacts: self.config.artifacts.clone(),
        }
    }
}
