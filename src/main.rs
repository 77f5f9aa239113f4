use crate::AppError::ConfigError;
use clap::Parser;
use osu2saber::{find_beatmap_sets, run_batch, Config, ConvertError, FfmpegAssets};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    let result = main_result();
    std::process::exit(match result {
        Ok(()) => 0,
        Err(err) => {
            // use Display instead of Debug for user friendly error messages
            log::error!("{err}");
            1
        }
    });
}

pub fn main_result() -> Result<(), AppError> {
    // setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("osu2saber=info"))
        .init();

    // args
    let args = CliArgs::parse();
    let source = args.source.canonicalize().map_err(|err| {
        ConfigError(format!("Source folder not found {:?}: {err}", args.source))
    })?;

    let destination = match (args.destination, args.songs) {
        (Some(destination), _) => destination,
        (None, true) => {
            let err = ConfigError("DESTINATION is required with --songs".to_string());
            return Err(err);
        }
        (None, false) => source
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError(format!("No parent folder for {source:?}")))?,
    };
    std::fs::create_dir_all(&destination)?;

    // read local config
    let config = match &args.config {
        Some(path) => {
            log::info!("Starting with configuration {path:?}");
            Config::from_path(path)?
        }
        None => Config::read_config()?,
    };
    let jobs = args.jobs.unwrap_or_else(|| config.jobs());
    if jobs == 0 {
        return Err(ConfigError("--jobs must be positive".to_string()));
    }

    let folders = find_beatmap_sets(&source, args.songs)?;
    log::info!(
        "Converting {} beatmap set(s) into {destination:?} with {jobs} job(s)",
        folders.len()
    );
    let assets = FfmpegAssets::new(
        config.ffmpeg_path.clone(),
        config.audio_timeout(),
        config.cover_size,
    );

    // go!
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(run_batch(
        folders,
        destination,
        Arc::new(config),
        Arc::new(assets),
        jobs,
    ));
    summary.report();
    if summary.is_success() {
        Ok(())
    } else {
        Err(AppError::ConversionError(summary.failed.len()))
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Beatmap set folder, or the osu! songs folder with --songs.
    source: PathBuf,
    /// Where the levels are written, defaults to the parent of a single set.
    destination: Option<PathBuf>,
    /// Convert every beatmap set folder found in SOURCE.
    #[arg(long, default_value_t = false)]
    songs: bool,
    /// Number of beatmap sets converted in parallel.
    #[arg(long)]
    jobs: Option<usize>,
    /// Optional path to a configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("{0} beatmap set(s) failed to convert")]
    ConversionError(usize),
    #[error("other error: {0}")]
    OtherError(String),
}

impl From<ConvertError> for AppError {
    fn from(error: ConvertError) -> Self {
        match error {
            ConvertError::Parse { .. } | ConvertError::UnsupportedVersion(_) => {
                Self::ParsingError(error.to_string())
            }
            ConvertError::Config(s) => Self::ConfigError(s),
            other => Self::OtherError(other.to_string()),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::OtherError(error.to_string())
    }
}
