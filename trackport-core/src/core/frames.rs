use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{trace, warn};

/// Numbered images produced by frame extraction for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrames {
    pub directory: PathBuf,
    /// Extension shared by all frames, without the dot
    pub extension: String,
    /// Sorted by frame number
    frames:        Vec<(u64, PathBuf)>,
}

impl ExtractedFrames {
    /// Lists the frames in `directory`: files named by a number with the
    /// given extension (case-insensitive). Anything else is ignored.
    #[inline]
    pub fn discover(
        sequence: &str,
        directory: &Path,
        extension: &str,
    ) -> Result<Self, MissingFramesError> {
        if !directory.is_dir() {
            return Err(MissingFramesError::DirectoryNotFound {
                sequence:  sequence.to_owned(),
                directory: directory.to_path_buf(),
            });
        }
        let entries = std::fs::read_dir(directory).map_err(|source| {
            MissingFramesError::Unreadable {
                sequence: sequence.to_owned(),
                directory: directory.to_path_buf(),
                source,
            }
        })?;

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MissingFramesError::Unreadable {
                sequence: sequence.to_owned(),
                directory: directory.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match frame_number(&path, extension) {
                Some(number) => frames.push((number, path)),
                None => trace!("Ignoring {} in frame directory", path.display()),
            }
        }
        if frames.is_empty() {
            return Err(MissingFramesError::Empty {
                sequence:  sequence.to_owned(),
                directory: directory.to_path_buf(),
                extension: extension.to_owned(),
            });
        }
        frames.sort();

        let extracted = Self {
            directory: directory.to_path_buf(),
            extension: extension.to_ascii_lowercase(),
            frames,
        };
        if !extracted.is_dense() {
            warn!(
                "Frames of {} in {} are not numbered 1..={}, using them in sorted order",
                sequence,
                directory.display(),
                extracted.len()
            );
        }

        Ok(extracted)
    }

    /// Authoritative frame count of the sequence.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame files in sequence order
    #[inline]
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.frames.iter().map(|(_, path)| path.as_path())
    }

    /// Whether the files are numbered exactly `1..=len`.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.frames.iter().zip(1..).all(|((number, _), expected)| *number == expected)
    }
}

fn frame_number(path: &Path, extension: &str) -> Option<u64> {
    let matches_extension = path
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
    if !matches_extension {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[derive(Debug, Error)]
pub enum MissingFramesError {
    #[error("No frame directory for {sequence} at {directory}")]
    DirectoryNotFound {
        sequence:  String,
        directory: PathBuf,
    },
    #[error("No .{extension} frames for {sequence} in {directory}")]
    Empty {
        sequence:  String,
        directory: PathBuf,
        extension: String,
    },
    #[error("Failed to list frames of {sequence} in {directory}: {source}")]
    Unreadable {
        sequence:  String,
        directory: PathBuf,
        source:    std::io::Error,
    },
}
