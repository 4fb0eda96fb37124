// THEORY:
// `fume_vision` estimates how much of a video's moving content has the colour of
// toxic fumes. It is a pure-Rust library: video decoding and encoding sit behind
// the `VideoBackend` trait, so the analysis itself never links a codec.
//
// The public entry point is `FumeAnalysisPipeline`. The two stages it chains
// (`BackgroundSubtractor` and `ColorClassifier`) and the per-pixel primitives in
// `core_modules` are public as well, for callers that want a single stage.

pub mod classifier;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod source;
pub mod subtractor;
pub mod watchdog;

pub use crate::classifier::{Classification, ColorClassifier};
pub use crate::config::{ArtifactPaths, FumeConfig, PipelineMode};
pub use crate::core_modules::accumulator::FrameCountOrigin;
pub use crate::core_modules::frame::{Frame, Geometry};
pub use crate::core_modules::hue_band::HueBand;
pub use crate::error::FumeError;
pub use crate::memory::MemoryBackend;
pub use crate::pipeline::{AnalysisResult, FrameObserver, FumeAnalysisPipeline, NoopObserver};
pub use crate::source::{FrameSink, FrameSource, StreamEnd, VideoBackend};
pub use crate::subtractor::{BackgroundSubtractor, SubtractedFrame};
