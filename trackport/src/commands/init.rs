use std::path::Path;

use anyhow::{Result, bail};
use tracing::{error, info};
use trackport_core::models::{export::ExportFormat, metadata::MetadataOverrides};

use crate::{DEFAULT_CONFIG_PATH, TrackportCliError, configuration::Configuration};

#[allow(clippy::too_many_arguments)]
pub fn init_handler(
    config_path: Option<&Path>,
    frames_path: Option<&Path>,
    output_path: Option<&Path>,
    format: Option<ExportFormat>,
    workers: Option<usize>,
    source_fps: Option<f64>,
    sampling_rate: Option<f64>,
    frame_stride: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = path_abs::PathAbs::new(
        config_path.map_or_else(|| cwd.join(DEFAULT_CONFIG_PATH), |p| p.to_path_buf()),
    )?
    .as_path()
    .to_path_buf();

    if config_path.exists() {
        let err = TrackportCliError::ConfigFileAlreadyExists(config_path);
        error!("{}", err);
        bail!(err);
    }

    let mut configuration = Configuration::default();
    if let Some(frames) = frames_path {
        configuration.frames_root = Some(path_abs::PathAbs::new(frames)?.as_path().to_path_buf());
    }
    if let Some(output) = output_path {
        configuration.output = Some(path_abs::PathAbs::new(output)?.as_path().to_path_buf());
    }
    if let Some(format) = format {
        configuration.format = format;
    }
    if let Some(workers) = workers {
        configuration.workers = workers;
    }
    configuration.metadata = MetadataOverrides {
        width,
        height,
        source_frame_rate: source_fps,
        sampling_rate,
        frame_stride,
    };

    configuration.save(&config_path)?;

    info!(
        "Initialized trackport configuration at: {}",
        config_path.display()
    );
    info!("Run \"trackport convert <export>\" to write MOTChallenge sequences.");

    Ok(())
}
