mod display;
mod video;

use crate::display::HighGuiObserver;
use crate::video::OpenCvBackend;
use anyhow::Context;
use clap::Parser;
use fume_vision::config::FumeConfig;
use fume_vision::error::FumeError;
use fume_vision::pipeline::FumeAnalysisPipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_SOURCE_UNAVAILABLE: u8 = 2;
const EXIT_EMPTY_STREAM: u8 = 3;
const EXIT_INVALID_CONFIG: u8 = 4;
const EXIT_INTERRUPTED: u8 = 130;

/// Estimates the share of an explosion video's moving content that has the
/// colour of toxic fumes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file to analyse
    video: PathBuf,

    /// Show the intermediate frames while analysing (press `q` to stop early)
    #[arg(long)]
    debug: bool,

    /// Configuration file (TOML, YAML or JSON); `FUME_*` variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON instead of the percentage line
    #[arg(long)]
    json: bool,

    /// Log every frame
    #[arg(short, long)]
    verbose: bool,
}

enum Outcome {
    Finished,
    Interrupted,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!("Failed to start the runtime: {}", error);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let outcome = runtime.block_on(run(args));
    // A decode call stuck inside OpenCV must not keep the process alive.
    runtime.shutdown_background();

    match outcome {
        Ok(Outcome::Finished) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => {
            warn!("Interrupted, no result was produced.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(error) => {
            error!("{:#}", error);
            ExitCode::from(exit_code(&error))
        }
    }
}

async fn run(args: Args) -> anyhow::Result<Outcome> {
    let config = FumeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let pipeline = FumeAnalysisPipeline::new(OpenCvBackend, config)?;
    let settings = pipeline.config();
    info!(
        mode = ?settings.mode,
        resize_percent = settings.resize_percent,
        diff_threshold = settings.diff_threshold,
        read_timeout = ?settings.read_timeout(),
        masked_video = %settings.artifacts.masked_video.display(),
        classified_video = %settings.artifacts.classified_video.display(),
        "Configuration loaded."
    );

    let video = args.video.clone();
    let debug = args.debug;
    let analysis = tokio::task::spawn_blocking(move || {
        if debug {
            pipeline.analyze_with(&video, &mut HighGuiObserver::new())
        } else {
            pipeline.analyze(&video)
        }
    });

    let result = tokio::select! {
        joined = analysis => joined
            .context("Analysis task failed")?
            .with_context(|| format!("Failed to analyse {}", args.video.display()))?,
        _ = tokio::signal::ctrl_c() => return Ok(Outcome::Interrupted),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Toxicity Percentage is: {}", result.toxicity_percentage);
    }
    Ok(Outcome::Finished)
}

fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<FumeError>() {
        Some(FumeError::SourceUnavailable { .. }) => EXIT_SOURCE_UNAVAILABLE,
        Some(FumeError::EmptyStream) => EXIT_EMPTY_STREAM,
        Some(FumeError::InvalidConfig(_) | FumeError::Config(_)) => EXIT_INVALID_CONFIG,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_parse() {
        let args = Args::parse_from([
            "fume_analyzer",
            "blast.mp4",
            "--debug",
            "--json",
            "-c",
            "fume.toml",
        ]);
        assert_eq!(args.video, PathBuf::from("blast.mp4"));
        assert!(args.debug && args.json && !args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("fume.toml")));
    }

    #[test]
    fn failures_map_to_exit_codes() {
        let unavailable = anyhow::Error::new(FumeError::source_unavailable("x.mp4", "missing"))
            .context("Failed to analyse x.mp4");
        assert_eq!(exit_code(&unavailable), EXIT_SOURCE_UNAVAILABLE);
        assert_eq!(exit_code(&anyhow::Error::new(FumeError::EmptyStream)), EXIT_EMPTY_STREAM);
        assert_eq!(
            exit_code(&anyhow::Error::new(FumeError::InvalidConfig("bad".into()))),
            EXIT_INVALID_CONFIG
        );
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }
}
