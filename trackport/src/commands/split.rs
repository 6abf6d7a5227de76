use std::path::Path;

use anyhow::{Result, bail};
use tracing::{error, info};
use trackport_core::{
    core::{export::load_export, partition::partition},
    models::export::ExportFormat,
};

use crate::commands::load_configuration;

pub fn split_handler(
    config_path: Option<&Path>,
    export_path: &Path,
    output_path: &Path,
    format: Option<ExportFormat>,
) -> Result<()> {
    let configuration = load_configuration(config_path)?;
    let export_path = path_abs::PathAbs::new(export_path)?.as_path().to_path_buf();
    let output = path_abs::PathAbs::new(output_path)?.as_path().to_path_buf();

    let export = match load_export(&export_path, format.unwrap_or(configuration.format)) {
        Ok(export) => export,
        Err(err) => {
            error!("{}", err);
            bail!(err);
        },
    };
    let partition = match partition(&export) {
        Ok(partition) => partition,
        Err(err) => {
            error!("{}", err);
            bail!(err);
        },
    };

    let written = partition.save_all(&output)?;
    info!(
        "Split {} into {} per-video exports in {}",
        export_path.display(),
        written.len(),
        output.display()
    );

    Ok(())
}
