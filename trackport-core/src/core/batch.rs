use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        self,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    core::{
        partition::{Partition, VideoUnit},
        serializer::{SequenceOutput, TrackSerializer},
    },
    models::{metadata::MetadataOverrides, sequence::SequenceConfig},
};

pub const REPORT_FILE_NAME: &str = "report.json";

/// Everything a conversion run needs besides the annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Parent of one extracted frame directory per sequence name
    pub frames_root: PathBuf,
    pub output:      PathBuf,
    pub workers:     usize,
    /// Used for whatever a video's sidecar does not state
    pub metadata:    MetadataOverrides,
    pub sequence:    SequenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchStatus {
    Processing {
        id:        String,
        completed: usize,
        total:     usize,
    },
    Completed {
        id: String,
    },
    Failed {
        id:    String,
        error: String,
    },
}

/// The result of one video in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SequenceOutcome {
    Converted {
        name:      String,
        key:       String,
        directory: PathBuf,
        frames:    usize,
        rows:      usize,
        tracks:    usize,
        warnings:  Vec<String>,
    },
    Failed {
        name:  String,
        key:   String,
        error: String,
    },
}

impl SequenceOutcome {
    #[inline]
    pub fn converted(unit: &VideoUnit, output: SequenceOutput) -> Self {
        Self::Converted {
            name:      output.name,
            key:       unit.key.clone(),
            directory: output.directory,
            frames:    output.frames,
            rows:      output.rows,
            tracks:    output.tracks,
            warnings:  output.warnings.iter().map(ToString::to_string).collect(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Self::Converted {
                name, ..
            }
            | Self::Failed {
                name, ..
            } => name,
        }
    }

    #[inline]
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// In partition order
    pub sequences: Vec<SequenceOutcome>,
}

impl BatchReport {
    #[inline]
    pub fn converted(&self) -> impl Iterator<Item = &SequenceOutcome> {
        self.sequences.iter().filter(|outcome| outcome.is_converted())
    }

    #[inline]
    pub fn failed(&self) -> impl Iterator<Item = &SequenceOutcome> {
        self.sequences.iter().filter(|outcome| !outcome.is_converted())
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create batch report {}", path.display()))?;
        file.write_all(&buf)?;
        file.write_all(b"\n")?;

        Ok(())
    }
}

/// Converts every unit of `partition` into a sequence directory under
/// `config.output`, then writes the batch report there.
///
/// A video that fails is recorded in the report and does not stop the others.
#[tracing::instrument(skip_all, fields(sequences = partition.len()))]
#[inline]
pub fn convert_all(
    partition: &Partition,
    config: &BatchConfig,
    progress_tx: Option<sync::mpsc::Sender<BatchStatus>>,
) -> Result<BatchReport> {
    std::fs::create_dir_all(&config.output)
        .with_context(|| format!("Failed to create output directory {}", config.output.display()))?;
    let serializer = TrackSerializer::new(&config.output, config.sequence.clone());
    let units = partition.units();
    let total = units.len();
    let workers = config.workers.clamp(1, total.max(1));
    info!("Converting {} sequences with {} workers", total, workers);

    let (task_tx, task_rx) = crossbeam_channel::unbounded();
    for index in 0..total {
        task_tx.send(index)?;
    }
    drop(task_tx);
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    let completed = AtomicUsize::new(0);

    thread::scope(|s| {
        for worker_id in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let progress_tx = progress_tx.clone();
            let (serializer, completed) = (&serializer, &completed);
            s.spawn(move || {
                for index in task_rx {
                    let unit = &units[index];
                    debug!("Converting {} with Worker {}", unit.sequence_name, worker_id);
                    let outcome =
                        match serializer.convert(unit, &config.frames_root, &config.metadata) {
                            Ok(output) => SequenceOutcome::converted(unit, output),
                            Err(err) => {
                                error!("Sequence {} failed: {}", unit.sequence_name, err);
                                SequenceOutcome::Failed {
                                    name:  unit.sequence_name.clone(),
                                    key:   unit.key.clone(),
                                    error: err.to_string(),
                                }
                            },
                        };
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress_tx) = &progress_tx {
                        send_progress(progress_tx, &outcome, done, total);
                    }
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut outcomes = result_rx.into_iter().collect::<Vec<_>>();
    outcomes.sort_by_key(|(index, _)| *index);
    let report = BatchReport {
        sequences: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };

    let report_path = config.output.join(REPORT_FILE_NAME);
    report.save(&report_path)?;
    let failed = report.failed().count();
    if failed > 0 {
        warn!("{} of {} sequences failed, see {}", failed, total, report_path.display());
    } else {
        info!("Converted {} sequences into {}", total, config.output.display());
    }

    Ok(report)
}

fn send_progress(
    progress_tx: &sync::mpsc::Sender<BatchStatus>,
    outcome: &SequenceOutcome,
    completed: usize,
    total: usize,
) {
    let id = outcome.name().to_owned();
    let status = match outcome {
        SequenceOutcome::Converted { .. } => BatchStatus::Completed {
            id: id.clone(),
        },
        SequenceOutcome::Failed {
            error, ..
        } => BatchStatus::Failed {
            id:    id.clone(),
            error: error.clone(),
        },
    };
    // A dropped receiver only means nobody is watching
    let _ = progress_tx.send(status);
    let _ = progress_tx.send(BatchStatus::Processing {
        id,
        completed,
        total,
    });
}
