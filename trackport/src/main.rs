use std::{panic, path::PathBuf, process};

use clap::{CommandFactory, Parser};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    commands::{
        Commands,
        TrackportCli,
        check::check_handler,
        convert::{ConvertArgs, convert_handler},
        init::init_handler,
        split::split_handler,
    },
    logging::init_logging,
};

mod commands;
mod configuration;
mod logging;

pub const DEFAULT_CONFIG_PATH: &str = "./trackport.json";
pub const DEFAULT_LOG_PATH: &str = "./logs/trackport.log";

fn main() -> anyhow::Result<()> {
    let orig_hook = panic::take_hook();
    // Catch panics in worker threads
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));
    run()
}

fn run() -> anyhow::Result<()> {
    let cli = TrackportCli::parse();
    let cwd = std::env::current_dir()?;
    let config_path = cli.config_file;
    let logs = cli.logs.unwrap_or_else(|| cwd.join(DEFAULT_LOG_PATH));
    let console_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    init_logging(console_level, &logs, LevelFilter::DEBUG)?;

    match cli.command {
        Commands::Init {
            frames,
            output,
            format,
            workers,
            source_fps,
            sampling_rate,
            frame_stride,
            width,
            height,
        } => {
            init_handler(
                config_path.as_deref(),
                frames.as_deref(),
                output.as_deref(),
                format,
                workers,
                source_fps,
                sampling_rate,
                frame_stride,
                width,
                height,
            )?;
        },
        Commands::Split {
            export,
            output,
            format,
        } => {
            split_handler(config_path.as_deref(), &export, &output, format)?;
        },
        Commands::Convert {
            export,
            frames,
            output,
            format,
            workers,
            alignment,
            schema,
            link,
            image_extension,
            source_fps,
            sampling_rate,
            frame_stride,
            width,
            height,
            no_detections,
            one_based,
        } => {
            convert_handler(config_path.as_deref(), &export, ConvertArgs {
                frames,
                output,
                format,
                workers,
                alignment,
                schema,
                link,
                image_extension,
                source_fps,
                sampling_rate,
                frame_stride,
                width,
                height,
                no_detections,
                one_based,
            })?;
        },
        Commands::Check {
            sequences,
        } => {
            check_handler(&sequences)?;
        },
        Commands::Completions {
            shell,
        } => {
            clap_complete::generate(
                shell,
                &mut TrackportCli::command(),
                "trackport",
                &mut std::io::stdout(),
            );
        },
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum TrackportCliError {
    #[error("Cannot initialize over an existing config file: {0}")]
    ConfigFileAlreadyExists(PathBuf),
    #[error("Failed to load config file: {0}")]
    ConfigLoadError(PathBuf),
    #[error("Cannot convert without a frames directory, set --frames or frames_root in the config")]
    NoFramesRoot,
    #[error("Cannot convert without an output directory, set --output or output in the config")]
    NoOutput,
    #[error("{failed} of {total} sequences failed to convert")]
    SequencesFailed { failed: usize, total: usize },
    #[error("{failed} of {total} sequences failed the check")]
    CheckFailed { failed: usize, total: usize },
    #[error("No sequence directories found in {0}")]
    NoSequences(PathBuf),
}
