use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{error, info};
use trackport_core::core::{descriptor::DESCRIPTOR_FILE_NAME, verify::check_sequence};

use crate::TrackportCliError;

pub fn check_handler(paths: &[PathBuf]) -> Result<()> {
    let mut sequences = Vec::new();
    for path in paths {
        let path = path_abs::PathAbs::new(path)?.as_path().to_path_buf();
        let found = sequence_directories(&path)?;
        if found.is_empty() {
            let err = TrackportCliError::NoSequences(path);
            error!("{}", err);
            bail!(err);
        }
        sequences.extend(found);
    }

    let total = sequences.len();
    let mut failed = 0;
    for sequence in &sequences {
        match check_sequence(sequence) {
            Ok(check) => info!(
                "{}: {} frames, {} rows, {} tracks",
                check.name, check.frames, check.rows, check.tracks
            ),
            Err(err) => {
                error!("{}: {}", sequence.display(), err);
                failed += 1;
            },
        }
    }

    if failed > 0 {
        let err = TrackportCliError::CheckFailed {
            failed,
            total,
        };
        error!("{}", err);
        bail!(err);
    }
    info!("All {} sequences are consistent", total);

    Ok(())
}

/// `path` itself when it is a sequence, otherwise its sequence subdirectories.
fn sequence_directories(path: &Path) -> Result<Vec<PathBuf>> {
    if path.join(DESCRIPTOR_FILE_NAME).is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Ok(Vec::new());
    }

    let mut sequences = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let directory = entry?.path();
        if directory.join(DESCRIPTOR_FILE_NAME).is_file() {
            sequences.push(directory);
        }
    }
    sequences.sort();

    Ok(sequences)
}
