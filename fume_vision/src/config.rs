// THEORY:
// Every tunable of the fume analysis lives in one `FumeConfig` passed to the
// pipeline at construction. Nothing is read from globals at run time.
//
// Loading is layered with the `config` crate, each layer overriding the previous:
// 1. the built-in defaults below,
// 2. an optional configuration file (TOML, YAML, JSON, ... by extension),
// 3. environment variables prefixed `FUME_`, with `__` separating nested keys
//    (`FUME_DIFF_THRESHOLD=25`, `FUME_ARTIFACTS__MASKED_VIDEO=/tmp/masked.avi`).
// Because the defaults are a real layer, a file may override a single field of a
// nested table (e.g. only `hue_band_low.hue_max`).

use crate::core_modules::accumulator::FrameCountOrigin;
use crate::core_modules::hue_band::HueBand;
use crate::error::FumeError;
use config::{Config, Environment, File, Source};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const ENV_PREFIX: &str = "FUME";

/// How the two stages are chained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Masked frames go straight from the subtractor to the classifier.
    #[default]
    Streaming,
    /// The subtractor finishes its artifact first, then the classifier re-reads it.
    TwoPass,
}

/// Where the two artifact videos are written. Both are overwritten on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Output of the background subtractor.
    pub masked_video: PathBuf,
    /// Output of the colour classifier.
    pub classified_video: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            masked_video: PathBuf::from("output/masked_video.avi"),
            classified_video: PathBuf::from("output/output_vid.avi"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FumeConfig {
    /// Rescale factor applied to every frame, in percent. 100 leaves frames untouched.
    pub resize_percent: u32,
    /// Minimum absolute luma difference for a pixel to count as changed.
    pub diff_threshold: u8,
    pub hue_band_low: HueBand,
    pub hue_band_high: HueBand,
    pub artifacts: ArtifactPaths,
    /// Frame rate written into both artifact videos.
    pub frame_rate: f64,
    pub frame_count_origin: FrameCountOrigin,
    pub mode: PipelineMode,
    /// Upper bound on a single frame read. Absent or zero disables the watchdog.
    pub read_timeout_ms: Option<u64>,
}

impl Default for FumeConfig {
    fn default() -> Self {
        Self {
            resize_percent: 100,
            diff_threshold: 20,
            hue_band_low: HueBand::LOW,
            hue_band_high: HueBand::HIGH,
            artifacts: ArtifactPaths::default(),
            frame_rate: 30.0,
            frame_count_origin: FrameCountOrigin::default(),
            mode: PipelineMode::default(),
            read_timeout_ms: Some(10_000),
        }
    }
}

impl FumeConfig {
    /// Defaults, then `path` if given, then `FUME_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, FumeError> {
        Self::layered(path.map(|path| File::from(path).required(true)), environment())
    }

    fn layered<S>(file: Option<S>, environment: Environment) -> Result<Self, FumeError>
    where
        S: Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder().add_source(Config::try_from(&FumeConfig::default())?);
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        let config: FumeConfig = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FumeError> {
        if self.resize_percent == 0 {
            return Err(FumeError::InvalidConfig(
                "resize_percent must be greater than zero".into(),
            ));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(FumeError::InvalidConfig(format!(
                "frame_rate must be a positive number, got {}",
                self.frame_rate
            )));
        }
        for (name, band) in [
            ("hue_band_low", &self.hue_band_low),
            ("hue_band_high", &self.hue_band_high),
        ] {
            if !band.is_well_formed() {
                return Err(FumeError::InvalidConfig(format!(
                    "{name} has a lower bound above its upper bound: {band:?}"
                )));
            }
        }
        if self.hue_band_low.overlaps(&self.hue_band_high) {
            warn!(
                low = ?self.hue_band_low,
                high = ?self.hue_band_high,
                "Hue bands overlap; pixels in both are counted once."
            );
        }
        let artifacts = &self.artifacts;
        if artifacts.masked_video.as_os_str().is_empty()
            || artifacts.classified_video.as_os_str().is_empty()
        {
            return Err(FumeError::InvalidConfig("artifact paths must not be empty".into()));
        }
        if artifacts.masked_video == artifacts.classified_video {
            return Err(FumeError::InvalidConfig(format!(
                "both artifacts would be written to {:?}",
                artifacts.masked_video
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }
}

/// `FUME_*` variables, `__` between nested keys.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{FileFormat, Map};

    fn from_toml(contents: &str) -> Result<FumeConfig, FumeError> {
        from_toml_and_env(contents, &[])
    }

    fn from_toml_and_env(contents: &str, vars: &[(&str, &str)]) -> Result<FumeConfig, FumeError> {
        let vars: Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        FumeConfig::layered(
            Some(File::from_str(contents, FileFormat::Toml)),
            environment().source(Some(vars)),
        )
    }

    #[test]
    fn defaults_match_the_legacy_constants() {
        let config = FumeConfig::default();
        assert_eq!(config.resize_percent, 100);
        assert_eq!(config.diff_threshold, 20);
        assert_eq!(config.hue_band_low, HueBand::LOW);
        assert_eq!(config.hue_band_high, HueBand::HIGH);
        assert_eq!(config.artifacts.masked_video, PathBuf::from("output/masked_video.avi"));
        assert_eq!(config.artifacts.classified_video, PathBuf::from("output/output_vid.avi"));
        assert_eq!(config.frame_rate, 30.0);
        assert_eq!(config.mode, PipelineMode::Streaming);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_overrides_single_fields() {
        let config = from_toml(
            r#"
            diff_threshold = 25
            frame_count_origin = "legacy"
            mode = "two_pass"

            [hue_band_low]
            hue_max = 30

            [artifacts]
            masked_video = "runs/masked.avi"
            "#,
        )
        .expect("config should load");

        assert_eq!(config.diff_threshold, 25);
        assert_eq!(config.frame_count_origin, FrameCountOrigin::Legacy);
        assert_eq!(config.mode, PipelineMode::TwoPass);
        assert_eq!(config.hue_band_low.hue_max, 30);
        assert_eq!(config.hue_band_low.saturation_min, HueBand::LOW.saturation_min);
        assert_eq!(config.hue_band_high, HueBand::HIGH);
        assert_eq!(config.artifacts.masked_video, PathBuf::from("runs/masked.avi"));
        assert_eq!(
            config.artifacts.classified_video,
            ArtifactPaths::default().classified_video
        );
    }

    #[test]
    fn environment_overrides_file_and_nested_keys() {
        let config = from_toml_and_env(
            "diff_threshold = 25",
            &[
                ("FUME_DIFF_THRESHOLD", "31"),
                ("FUME_MODE", "two_pass"),
                ("FUME_ARTIFACTS__MASKED_VIDEO", "/tmp/fume/masked.avi"),
                ("FUME_HUE_BAND_HIGH__HUE_MIN", "150"),
                ("UNRELATED_DIFF_THRESHOLD", "99"),
            ],
        )
        .expect("config should load");

        assert_eq!(config.diff_threshold, 31);
        assert_eq!(config.mode, PipelineMode::TwoPass);
        assert_eq!(config.artifacts.masked_video, PathBuf::from("/tmp/fume/masked.avi"));
        assert_eq!(
            config.artifacts.classified_video,
            ArtifactPaths::default().classified_video
        );
        assert_eq!(config.hue_band_high.hue_min, 150);
        assert_eq!(config.hue_band_high.hue_max, HueBand::HIGH.hue_max);
    }

    #[test]
    fn invalid_environment_values_are_rejected() {
        let error = from_toml_and_env("", &[("FUME_RESIZE_PERCENT", "0")]).unwrap_err();
        assert!(matches!(error, FumeError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let error = from_toml("resize_percent = 0").unwrap_err();
        assert!(matches!(error, FumeError::InvalidConfig(_)));

        let error = from_toml("[hue_band_high]\nhue_min = 200\nhue_max = 100").unwrap_err();
        assert!(matches!(error, FumeError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let error = from_toml("diff_threshold = \"loud\"").unwrap_err();
        assert!(matches!(error, FumeError::Config(_)));
    }

    #[test]
    fn overlapping_bands_are_allowed() {
        let mut config = FumeConfig::default();
        config.hue_band_high.hue_min = 40;
        assert!(config.hue_band_low.overlaps(&config.hue_band_high));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn identical_artifact_paths_are_rejected() {
        let mut config = FumeConfig::default();
        config.artifacts.classified_video = config.artifacts.masked_video.clone();
        assert!(matches!(config.validate(), Err(FumeError::InvalidConfig(_))));
    }

    #[test]
    fn non_positive_frame_rate_is_rejected() {
        let mut config = FumeConfig::default();
        config.frame_rate = 0.0;
        assert!(config.validate().is_err());
        config.frame_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_disables_the_watchdog() {
        let mut config = FumeConfig::default();
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(10)));
        config.read_timeout_ms = Some(0);
        assert_eq!(config.read_timeout(), None);
        config.read_timeout_ms = None;
        assert_eq!(config.read_timeout(), None);
    }
}
