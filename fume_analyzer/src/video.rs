// OpenCV implementation of the `VideoBackend` seam. OpenCV decodes to BGR; frames
// cross into `fume_vision` as RGB and are converted back when written.

use fume_vision::core_modules::frame::{Frame, Geometry};
use fume_vision::error::FumeError;
use fume_vision::source::{FrameSink, FrameSource, VideoBackend};
use image::GrayImage;
use opencv::{
    core::{self, Mat, Scalar},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl VideoBackend for OpenCvBackend {
    type Source = OpenCvSource;
    type Sink = OpenCvSink;

    fn open(&self, path: &Path) -> Result<OpenCvSource, FumeError> {
        let capture = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
            .map_err(|error| FumeError::source_unavailable(path, error))?;
        if !capture
            .is_opened()
            .map_err(|error| FumeError::source_unavailable(path, error))?
        {
            return Err(FumeError::source_unavailable(path, "container could not be opened"));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
        let geometry = (width > 0 && height > 0).then(|| Geometry::new(width, height));
        debug!(path = %path.display(), ?geometry, "Opened video.");

        Ok(OpenCvSource {
            capture,
            geometry,
            closed: false,
        })
    }

    fn create(
        &self,
        path: &Path,
        geometry: Geometry,
        frame_rate: f64,
    ) -> Result<OpenCvSink, FumeError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| FumeError::ArtifactIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')
            .map_err(|error| FumeError::artifact_write(path, error))?;
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            frame_rate,
            core::Size::new(geometry.width as i32, geometry.height as i32),
            true,
        )
        .map_err(|error| FumeError::artifact_write(path, error))?;
        if !writer
            .is_opened()
            .map_err(|error| FumeError::artifact_write(path, error))?
        {
            return Err(FumeError::artifact_write(path, "no MJPG encoder accepted the file"));
        }

        Ok(OpenCvSink {
            path: path.to_path_buf(),
            geometry,
            writer,
        })
    }
}

pub struct OpenCvSource {
    capture: VideoCapture,
    geometry: Option<Geometry>,
    closed: bool,
}

impl FrameSource for OpenCvSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FumeError> {
        if self.closed {
            return Ok(None);
        }

        let mut bgr = Mat::default();
        match self.capture.read(&mut bgr) {
            Ok(true) if !bgr.empty() => {}
            Ok(_) => {
                self.closed = true;
                return Ok(None);
            }
            Err(error) => {
                self.closed = true;
                return Err(FumeError::TransientDecode(error.to_string()));
            }
        }

        match bgr_to_frame(&bgr) {
            Ok(frame) => {
                self.geometry.get_or_insert_with(|| Geometry::of(&frame));
                Ok(Some(frame))
            }
            Err(error) => {
                self.closed = true;
                Err(FumeError::TransientDecode(error.to_string()))
            }
        }
    }

    fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }
}

pub struct OpenCvSink {
    path: PathBuf,
    geometry: Geometry,
    writer: VideoWriter,
}

impl FrameSink for OpenCvSink {
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
        let bgr =
            frame_to_bgr(frame).map_err(|error| FumeError::artifact_write(&self.path, error))?;
        self.writer
            .write(&bgr)
            .map_err(|error| FumeError::artifact_write(&self.path, error))
    }

    fn finish(&mut self) -> Result<(), FumeError> {
        self.writer
            .release()
            .map_err(|error| FumeError::artifact_write(&self.path, error))
    }
}

fn bgr_to_frame(bgr: &Mat) -> opencv::Result<Frame> {
    let mut rgb = Mat::default();
    match bgr.channels() {
        3 => imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?,
        1 => imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_GRAY2RGB, 0)?,
        channels => {
            return Err(opencv::Error::new(
                core::StsBadArg,
                format!("unsupported channel count {channels}"),
            ));
        }
    }
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    Frame::from_raw(width, height, rgb.data_bytes()?.to_vec()).ok_or_else(|| {
        opencv::Error::new(
            core::StsUnmatchedSizes,
            format!("decoded buffer does not hold a {width}x{height} RGB frame"),
        )
    })
}

/// Copies an RGB frame into a new BGR `Mat`.
pub fn frame_to_bgr(frame: &Frame) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Copies a single-channel image into a new `Mat`.
pub fn gray_to_mat(image: &GrayImage) -> opencv::Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        core::CV_8UC1,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}
