use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use clap_complete::Shell;
use tracing::{debug, error, trace};
use trackport_core::models::{
    export::ExportFormat,
    sequence::{AlignmentMode, GroundTruthSchema, ImageLinkMethod},
};

use crate::{
    DEFAULT_CONFIG_PATH,
    TrackportCliError,
    configuration::{ConfigError, Configuration},
};

pub mod check;
pub mod convert;
pub mod init;
pub mod split;

#[derive(ClapParser)]
#[command(
    name = "trackport",
    about = "Converts sparse video annotation exports into MOTChallenge sequences.",
    version
)]
pub struct TrackportCli {
    #[command(subcommand)]
    pub command:     Commands,
    /// Specify the location of the config file. Defaults to `./trackport.json`.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,
    /// Specify the log file. Defaults to `./logs/trackport.log`.
    #[arg(long, global = true)]
    pub logs:        Option<PathBuf>,
    /// Print debug messages to the console
    #[arg(long, short('v'), global = true)]
    pub verbose:     bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new configuration.
    Init {
        /// Directory holding one extracted frame directory per video
        #[arg(long)]
        frames:        Option<PathBuf>,
        /// Directory the sequences are written to
        #[arg(long, short('o'))]
        output:        Option<PathBuf>,
        #[arg(long)]
        format:        Option<ExportFormat>,
        #[arg(long, short('w'))]
        workers:       Option<usize>,
        /// Frame rate of the source videos
        #[arg(long)]
        source_fps:    Option<f64>,
        /// Rate frames were extracted at
        #[arg(long)]
        sampling_rate: Option<f64>,
        /// Extract every n-th source frame (alternative to --sampling-rate)
        #[arg(long)]
        frame_stride:  Option<u32>,
        #[arg(long)]
        width:         Option<u32>,
        #[arg(long)]
        height:        Option<u32>,
    },
    /// Split an export into one COCO file per video
    Split {
        export: PathBuf,
        #[arg(long, short('o'))]
        output: PathBuf,
        #[arg(long)]
        format: Option<ExportFormat>,
    },
    /// Convert an export into MOTChallenge sequence directories
    Convert {
        export:          PathBuf,
        #[arg(long)]
        frames:          Option<PathBuf>,
        #[arg(long, short('o'))]
        output:          Option<PathBuf>,
        #[arg(long)]
        format:          Option<ExportFormat>,
        #[arg(long, short('w'))]
        workers:         Option<usize>,
        #[arg(long)]
        alignment:       Option<AlignmentMode>,
        #[arg(long)]
        schema:          Option<GroundTruthSchema>,
        #[arg(long)]
        link:            Option<ImageLinkMethod>,
        /// Extension of the extracted frames, without the dot
        #[arg(long)]
        image_extension: Option<String>,
        #[arg(long)]
        source_fps:      Option<f64>,
        #[arg(long)]
        sampling_rate:   Option<f64>,
        #[arg(long)]
        frame_stride:    Option<u32>,
        #[arg(long)]
        width:           Option<u32>,
        #[arg(long)]
        height:          Option<u32>,
        /// Do not write det/det.txt
        #[arg(long)]
        no_detections:   bool,
        /// Shift boxes for tools that expect 1-based pixel coordinates
        #[arg(long)]
        one_based:       bool,
    },
    /// Check written sequence directories for consistency
    Check {
        /// Sequence directories, or directories containing them
        #[arg(required = true)]
        sequences: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Loads the configuration file, falling back to defaults when there is none.
pub fn load_configuration(config_path: Option<&Path>) -> Result<Configuration> {
    let config_path =
        path_abs::PathAbs::new(config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH)))?
            .as_path()
            .to_path_buf();

    match Configuration::load(&config_path) {
        Ok(Some(configuration)) => {
            debug!("Loaded configuration from {}", config_path.display());
            Ok(configuration)
        },
        Ok(None) => {
            trace!("No existing configuration found");
            Ok(Configuration::default())
        },
        Err(ConfigError::Load(path)) => {
            let err = TrackportCliError::ConfigLoadError(path);
            error!("{}", err);
            bail!(err);
        },
        Err(err) => {
            error!("{}", err);
            bail!(err);
        },
    }
}
