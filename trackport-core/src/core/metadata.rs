use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::models::metadata::{MetadataOverrides, VideoMetadata};

/// Name of the per-video metadata file written next to the extracted frames
pub const SIDECAR_FILE_NAME: &str = "video.json";

/// Loads `video.json` from a frame directory, if there is one.
#[inline]
pub fn load_sidecar(frames_directory: &Path) -> Result<Option<MetadataOverrides>, MetadataError> {
    let path = frames_directory.join(SIDECAR_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|source| MetadataError::Read {
        path:   path.clone(),
        source,
    })?;
    let overrides = serde_json::from_str(&text).map_err(|source| MetadataError::Parse {
        path,
        source,
    })?;
    debug!("Loaded video metadata from {}", frames_directory.display());

    Ok(Some(overrides))
}

/// Sidecar values over configured defaults, checked for completeness.
#[inline]
pub fn resolve(
    sequence: &str,
    sidecar: Option<&MetadataOverrides>,
    defaults: &MetadataOverrides,
) -> Result<VideoMetadata, MetadataError> {
    let merged = sidecar.map_or(*defaults, |sidecar| sidecar.or(defaults));
    let missing = |field: &'static str| MetadataError::Missing {
        sequence: sequence.to_owned(),
        field,
    };

    let width = merged.width.ok_or_else(|| missing("width"))?;
    let height = merged.height.ok_or_else(|| missing("height"))?;
    let source_frame_rate = merged.source_frame_rate.ok_or_else(|| missing("source_frame_rate"))?;
    let sampling_rate = match (merged.sampling_rate, merged.frame_stride) {
        (Some(rate), _) => rate,
        (None, Some(stride)) if stride > 0 => source_frame_rate / f64::from(stride),
        (None, Some(_)) => {
            return Err(MetadataError::Invalid {
                sequence: sequence.to_owned(),
                field:    "frame_stride",
            });
        },
        (None, None) => return Err(missing("sampling_rate")),
    };

    let metadata = VideoMetadata {
        width,
        height,
        source_frame_rate,
        sampling_rate,
    };
    validate(sequence, &metadata)?;

    Ok(metadata)
}

#[inline]
pub fn validate(sequence: &str, metadata: &VideoMetadata) -> Result<(), MetadataError> {
    let invalid = |field: &'static str| MetadataError::Invalid {
        sequence: sequence.to_owned(),
        field,
    };
    if metadata.width == 0 {
        return Err(invalid("width"));
    }
    if metadata.height == 0 {
        return Err(invalid("height"));
    }
    if !(metadata.source_frame_rate.is_finite() && metadata.source_frame_rate > 0.0) {
        return Err(invalid("source_frame_rate"));
    }
    if !(metadata.sampling_rate.is_finite() && metadata.sampling_rate > 0.0) {
        return Err(invalid("sampling_rate"));
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read video metadata {path}: {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse video metadata {path}: {source}")]
    Parse {
        path:   PathBuf,
        source: serde_json::Error,
    },
    #[error("No {field} known for {sequence}")]
    Missing {
        sequence: String,
        field:    &'static str,
    },
    #[error("Invalid {field} for {sequence}")]
    Invalid {
        sequence: String,
        field:    &'static str,
    },
}
