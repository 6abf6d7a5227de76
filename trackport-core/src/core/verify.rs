use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    core::{
        descriptor::{DESCRIPTOR_FILE_NAME, DescriptorError},
        ground_truth::{GROUND_TRUTH_DIRECTORY, GROUND_TRUTH_FILE_NAME, GroundTruthError, parse_row},
    },
    models::sequence::SequenceDescriptor,
};

/// Summary of a sequence directory that passed every check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceCheck {
    pub name:   String,
    pub frames: usize,
    pub rows:   usize,
    pub tracks: usize,
}

/// Checks a written MOTChallenge sequence directory for internal consistency.
#[inline]
pub fn check_sequence(directory: &Path) -> Result<SequenceCheck, CheckError> {
    let descriptor = SequenceDescriptor::load(&directory.join(DESCRIPTOR_FILE_NAME))?;

    let image_directory = directory.join(&descriptor.image_dir);
    let images = count_images(&image_directory, &descriptor.image_ext)?;
    if images != descriptor.length {
        return Err(CheckError::LengthMismatch {
            declared: descriptor.length,
            images,
        });
    }

    let ground_truth = directory.join(GROUND_TRUTH_DIRECTORY).join(GROUND_TRUTH_FILE_NAME);
    let text = std::fs::read_to_string(&ground_truth).map_err(|source| CheckError::Io {
        path: ground_truth.clone(),
        source,
    })?;

    let mut previous: Option<(i64, i64)> = None;
    let mut tracks = BTreeSet::new();
    let mut rows = 0;
    for (index, line) in text.lines().enumerate().filter(|(_, line)| !line.trim().is_empty()) {
        let line_number = index + 1;
        let row = parse_row(line).map_err(|source| CheckError::Row {
            line: line_number,
            source,
        })?;
        if row.frame < 1 || row.frame > descriptor.length as i64 {
            return Err(CheckError::FrameOutOfRange {
                line:   line_number,
                frame:  row.frame,
                length: descriptor.length,
            });
        }
        let key = (row.frame, row.track_id);
        if previous.is_some_and(|previous| previous >= key) {
            return Err(CheckError::Unordered {
                line: line_number,
            });
        }
        previous = Some(key);
        tracks.insert(row.track_id);
        rows += 1;
    }

    // Dense ids are exactly 1..=K
    let expected = 1..=tracks.len() as i64;
    if !tracks.iter().copied().eq(expected) {
        return Err(CheckError::SparseTrackIds {
            ids: tracks.into_iter().collect(),
        });
    }

    debug!("{} has {} ground-truth rows", directory.display(), rows);
    info!("{} is a consistent sequence", descriptor.name);

    Ok(SequenceCheck {
        name: descriptor.name,
        frames: descriptor.length,
        rows,
        tracks: tracks.len(),
    })
}

fn count_images(directory: &Path, image_ext: &str) -> Result<usize, CheckError> {
    let extension = image_ext.trim_start_matches('.');
    let entries = std::fs::read_dir(directory).map_err(|source| CheckError::Io {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut count = 0;
    for entry in entries {
        let path = entry
            .map_err(|source| CheckError::Io {
                path: directory.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        {
            count += 1;
        }
    }

    Ok(count)
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("Failed to read {path}: {source}")]
    Io {
        path:   PathBuf,
        source: std::io::Error,
    },
    #[error("seqLength is {declared} but there are {images} images")]
    LengthMismatch { declared: usize, images: usize },
    #[error("Ground truth line {line}: {source}")]
    Row {
        line:   usize,
        source: GroundTruthError,
    },
    #[error("Ground truth line {line}: frame {frame} is outside 1..={length}")]
    FrameOutOfRange {
        line:   usize,
        frame:  i64,
        length: usize,
    },
    #[error("Ground truth line {line} is not ordered by frame, then track id")]
    Unordered { line: usize },
    #[error("Track ids are not dense: {ids:?}")]
    SparseTrackIds { ids: Vec<i64> },
}
