use std::{
    path::{Path, PathBuf},
    sync,
    thread,
};

use anyhow::{Result, bail};
use tracing::{debug, error, info, warn};
use trackport_core::{
    core::{
        batch::{BatchConfig, BatchStatus, REPORT_FILE_NAME, convert_all},
        export::load_export,
        partition::partition,
    },
    models::{
        export::ExportFormat,
        metadata::MetadataOverrides,
        sequence::{AlignmentMode, GroundTruthSchema, ImageLinkMethod},
    },
};

use crate::{TrackportCliError, commands::load_configuration, configuration::Configuration};

/// Flags given on the command line, each overriding the configuration file.
pub struct ConvertArgs {
    pub frames:          Option<PathBuf>,
    pub output:          Option<PathBuf>,
    pub format:          Option<ExportFormat>,
    pub workers:         Option<usize>,
    pub alignment:       Option<AlignmentMode>,
    pub schema:          Option<GroundTruthSchema>,
    pub link:            Option<ImageLinkMethod>,
    pub image_extension: Option<String>,
    pub source_fps:      Option<f64>,
    pub sampling_rate:   Option<f64>,
    pub frame_stride:    Option<u32>,
    pub width:           Option<u32>,
    pub height:          Option<u32>,
    pub no_detections:   bool,
    pub one_based:       bool,
}

impl ConvertArgs {
    /// Applies the flags to a loaded configuration.
    pub fn apply(self, configuration: &mut Configuration) {
        if let Some(frames) = self.frames {
            configuration.frames_root = Some(frames);
        }
        if let Some(output) = self.output {
            configuration.output = Some(output);
        }
        if let Some(format) = self.format {
            configuration.format = format;
        }
        if let Some(workers) = self.workers {
            configuration.workers = workers;
        }
        let sequence = &mut configuration.sequence;
        if let Some(alignment) = self.alignment {
            sequence.alignment = alignment;
        }
        if let Some(schema) = self.schema {
            sequence.schema = schema;
        }
        if let Some(link) = self.link {
            sequence.link = link;
        }
        if let Some(image_extension) = self.image_extension {
            sequence.image_extension = image_extension.trim_start_matches('.').to_owned();
        }
        if self.no_detections {
            sequence.detections = false;
        }
        if self.one_based {
            sequence.one_based_coordinates = true;
        }
        let flags = MetadataOverrides {
            width:             self.width,
            height:            self.height,
            source_frame_rate: self.source_fps,
            sampling_rate:     self.sampling_rate,
            frame_stride:      self.frame_stride,
        };
        configuration.metadata = flags.or(&configuration.metadata);
    }
}

pub fn convert_handler(config_path: Option<&Path>, export_path: &Path, args: ConvertArgs) -> Result<()> {
    let mut configuration = load_configuration(config_path)?;
    args.apply(&mut configuration);
    debug!("Converting with {:?}", configuration);

    let Some(frames_root) = configuration.frames_root.as_deref() else {
        let err = TrackportCliError::NoFramesRoot;
        error!("{}", err);
        bail!(err);
    };
    let Some(output) = configuration.output.as_deref() else {
        let err = TrackportCliError::NoOutput;
        error!("{}", err);
        bail!(err);
    };
    let batch_config = BatchConfig {
        frames_root: path_abs::PathAbs::new(frames_root)?.as_path().to_path_buf(),
        output:      path_abs::PathAbs::new(output)?.as_path().to_path_buf(),
        workers:     configuration.workers,
        metadata:    configuration.metadata,
        sequence:    configuration.sequence.clone(),
    };

    let export_path = path_abs::PathAbs::new(export_path)?.as_path().to_path_buf();
    let export = match load_export(&export_path, configuration.format) {
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

    let (progress_tx, progress_rx) = sync::mpsc::channel();
    let report = thread::scope(|s| {
        s.spawn(move || {
            for status in progress_rx {
                match status {
                    BatchStatus::Processing {
                        completed,
                        total,
                        ..
                    } => debug!("{}/{} sequences done", completed, total),
                    BatchStatus::Completed {
                        id,
                    } => info!("Finished sequence {}", id),
                    BatchStatus::Failed {
                        id,
                        error,
                    } => warn!("Sequence {} failed: {}", id, error),
                }
            }
        });
        convert_all(&partition, &batch_config, Some(progress_tx))
    })?;

    let total = report.sequences.len();
    let failed = report.failed().count();
    if failed > 0 {
        let err = TrackportCliError::SequencesFailed {
            failed,
            total,
        };
        error!("{}", err);
        bail!(err);
    }
    info!(
        "Wrote {} sequences to {}, see {} for details",
        total,
        batch_config.output.display(),
        batch_config.output.join(REPORT_FILE_NAME).display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConvertArgs {
        ConvertArgs {
            frames:          None,
            output:          None,
            format:          None,
            workers:         None,
            alignment:       None,
            schema:          None,
            link:            None,
            image_extension: None,
            source_fps:      None,
            sampling_rate:   None,
            frame_stride:    None,
            width:           None,
            height:          None,
            no_detections:   false,
            one_based:       false,
        }
    }

    #[test]
    fn flags_override_configuration() {
        let mut configuration = Configuration {
            workers: 2,
            metadata: MetadataOverrides {
                width: Some(1280),
                height: Some(720),
                sampling_rate: Some(1.0),
                ..Default::default()
            },
            ..Default::default()
        };
        ConvertArgs {
            workers: Some(8),
            schema: Some(GroundTruthSchema::Mot17),
            image_extension: Some(".png".to_owned()),
            frame_stride: Some(15),
            no_detections: true,
            ..args()
        }
        .apply(&mut configuration);

        assert_eq!(configuration.workers, 8);
        assert_eq!(configuration.sequence.schema, GroundTruthSchema::Mot17);
        assert_eq!(configuration.sequence.image_extension, "png");
        assert!(!configuration.sequence.detections);
        assert_eq!(configuration.metadata.width, Some(1280));
        assert_eq!(configuration.metadata.frame_stride, Some(15));
        assert_eq!(configuration.metadata.sampling_rate, None);
    }

    #[test]
    fn no_flags_keep_configuration() {
        let mut configuration = Configuration::default();
        args().apply(&mut configuration);
        assert_eq!(configuration, Configuration::default());
    }
}
