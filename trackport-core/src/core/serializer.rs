use std::{
    collections::{HashMap, hash_map::Entry},
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    core::{
        alignment::{AlignmentAmbiguityWarning, UntimedImagesWarning, align},
        descriptor::DESCRIPTOR_FILE_NAME,
        frames::{ExtractedFrames, MissingFramesError},
        ground_truth::{
            DETECTIONS_DIRECTORY,
            DETECTIONS_FILE_NAME,
            GROUND_TRUTH_DIRECTORY,
            GROUND_TRUTH_FILE_NAME,
            format_detection,
            render,
        },
        metadata::{MetadataError, load_sidecar, resolve},
        partition::VideoUnit,
        tracks::TrackIdTable,
    },
    models::{
        export::{Annotation, BoundingBox, BoxUnits, Image, RecordId},
        metadata::{MetadataOverrides, VideoMetadata},
        sequence::{
            DEFAULT_IMAGE_DIRECTORY,
            GroundTruthRow,
            IMAGE_NAME_WIDTH,
            ImageLinkMethod,
            SequenceConfig,
            SequenceDescriptor,
        },
    },
};

/// Ground truth of one sequence before it is written.
#[derive(Debug, Clone)]
pub struct SerializedTracks {
    /// Sorted by frame, then track id
    pub rows:     Vec<GroundTruthRow>,
    pub tracks:   TrackIdTable,
    pub warnings: Vec<SequenceWarning>,
}

/// Aligns a unit onto `frame_count` extracted frames and builds its rows.
#[inline]
pub fn build_rows(
    unit: &VideoUnit,
    metadata: &VideoMetadata,
    frame_count: usize,
    config: &SequenceConfig,
) -> SerializedTracks {
    let alignment = align(unit, metadata, frame_count, config.alignment);
    let mut warnings = alignment
        .untimed
        .map(SequenceWarning::from)
        .into_iter()
        .chain(alignment.collisions.into_iter().map(SequenceWarning::from))
        .collect::<Vec<_>>();

    let mut annotations_by_image: HashMap<&RecordId, Vec<&Annotation>> = HashMap::new();
    for annotation in &unit.annotations {
        annotations_by_image.entry(&annotation.image_id).or_default().push(annotation);
    }

    let mut tracks = TrackIdTable::new();
    let mut rows = Vec::with_capacity(unit.annotations.len());
    for (&frame, &image_index) in &alignment.frames {
        let image = &unit.images[image_index];
        let Some(annotations) = annotations_by_image.get(&image.id) else {
            trace!("Frame {} of {} has no visible objects", frame, unit.sequence_name);
            continue;
        };
        let mut row_by_track: HashMap<RecordId, usize> = HashMap::new();
        for annotation in annotations {
            let source = annotation.source_track();
            let row = GroundTruthRow {
                frame,
                track_id: tracks.id_for(&source),
                bbox: pixel_box(annotation, image, metadata, config.one_based_coordinates),
                category: annotation.category_id.clone(),
            };
            match row_by_track.entry(source) {
                Entry::Occupied(existing) => {
                    let warning = SequenceWarning::DuplicateTrack {
                        sequence: unit.sequence_name.clone(),
                        frame,
                        track: existing.key().clone(),
                        image: image.id.clone(),
                        kept: annotation.id.clone(),
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                    rows[*existing.get()] = row;
                },
                Entry::Vacant(slot) => {
                    slot.insert(rows.len());
                    rows.push(row);
                },
            }
        }
    }
    rows.sort_by_key(|row| (row.frame, row.track_id));

    SerializedTracks {
        rows,
        tracks,
        warnings,
    }
}

/// Box in pixels of the extracted frames.
#[inline]
pub fn pixel_box(
    annotation: &Annotation,
    image: &Image,
    metadata: &VideoMetadata,
    one_based: bool,
) -> BoundingBox {
    let (width, height) = (f64::from(metadata.width), f64::from(metadata.height));
    let bbox = match annotation.bbox_units {
        BoxUnits::Percent => annotation.bbox.scaled(width / 100.0, height / 100.0),
        BoxUnits::Pixels => match image.resolution() {
            Some((image_width, image_height))
                if image_width > 0
                    && image_height > 0
                    && (image_width, image_height) != metadata.resolution() =>
            {
                annotation.bbox.scaled(
                    width / f64::from(image_width),
                    height / f64::from(image_height),
                )
            },
            _ => annotation.bbox,
        },
    };
    if one_based { bbox.translated(1.0, 1.0) } else { bbox }
}

/// Writes MOTChallenge sequence directories under `output_root`.
#[derive(Debug, Clone)]
pub struct TrackSerializer {
    pub output_root: PathBuf,
    pub config:      SequenceConfig,
}

impl TrackSerializer {
    #[inline]
    pub fn new(output_root: &Path, config: SequenceConfig) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            config,
        }
    }

    #[inline]
    pub fn sequence_directory(&self, sequence: &str) -> PathBuf {
        self.output_root.join(sequence)
    }

    fn staging_directory(&self, sequence: &str) -> PathBuf {
        self.output_root.join(format!(".{}.partial", sequence))
    }

    /// Converts one unit using the frames in `frames_root/<sequence name>`.
    ///
    /// On failure nothing is left behind for the sequence, including output
    /// from earlier runs.
    #[inline]
    pub fn convert(
        &self,
        unit: &VideoUnit,
        frames_root: &Path,
        metadata_defaults: &MetadataOverrides,
    ) -> Result<SequenceOutput, SerializeError> {
        let result = self.try_convert(unit, frames_root, metadata_defaults);
        if let Err(err) = &result {
            warn!("Sequence {} failed: {}", unit.sequence_name, err);
            self.remove_output(&unit.sequence_name);
        }
        result
    }

    fn try_convert(
        &self,
        unit: &VideoUnit,
        frames_root: &Path,
        metadata_defaults: &MetadataOverrides,
    ) -> Result<SequenceOutput, SerializeError> {
        let frames_directory = frames_root.join(&unit.sequence_name);
        let frames = ExtractedFrames::discover(
            &unit.sequence_name,
            &frames_directory,
            &self.config.image_extension,
        )?;
        let sidecar = load_sidecar(&frames_directory)?;
        let metadata = resolve(&unit.sequence_name, sidecar.as_ref(), metadata_defaults)?;

        self.serialize(unit, &frames, &metadata)
    }

    #[inline]
    pub fn descriptor(
        &self,
        unit: &VideoUnit,
        frames: &ExtractedFrames,
        metadata: &VideoMetadata,
    ) -> SequenceDescriptor {
        SequenceDescriptor {
            name:       unit.sequence_name.clone(),
            image_dir:  DEFAULT_IMAGE_DIRECTORY.to_owned(),
            frame_rate: metadata.sampling_rate,
            length:     frames.len(),
            width:      metadata.width,
            height:     metadata.height,
            image_ext:  format!(".{}", frames.extension),
        }
    }

    /// Builds the sequence in a staging directory and swaps it in place of
    /// any previous output.
    #[inline]
    pub fn serialize(
        &self,
        unit: &VideoUnit,
        frames: &ExtractedFrames,
        metadata: &VideoMetadata,
    ) -> Result<SequenceOutput, SerializeError> {
        let sequence = unit.sequence_name.as_str();
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SerializeError::Io {
                sequence: sequence.to_owned(),
                path,
                source,
            }
        };

        let mut serialized = build_rows(unit, metadata, frames.len(), &self.config);
        if !frames.is_dense() {
            serialized.warnings.push(SequenceWarning::SparseFrameNumbering {
                sequence: sequence.to_owned(),
                count:    frames.len(),
            });
        }
        let descriptor = self.descriptor(unit, frames, metadata);

        let staging = self.staging_directory(sequence);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
        }
        fs::create_dir_all(&staging).map_err(io_error(&staging))?;

        self.materialize_images(sequence, frames, &staging.join(&descriptor.image_dir))?;

        let ground_truth_directory = staging.join(GROUND_TRUTH_DIRECTORY);
        fs::create_dir_all(&ground_truth_directory).map_err(io_error(&ground_truth_directory))?;
        let ground_truth = ground_truth_directory.join(GROUND_TRUTH_FILE_NAME);
        let schema = self.config.schema;
        fs::write(&ground_truth, render(&serialized.rows, |row| schema.format_row(row)))
            .map_err(io_error(&ground_truth))?;

        if self.config.detections {
            let detections_directory = staging.join(DETECTIONS_DIRECTORY);
            fs::create_dir_all(&detections_directory).map_err(io_error(&detections_directory))?;
            let detections = detections_directory.join(DETECTIONS_FILE_NAME);
            fs::write(&detections, render(&serialized.rows, format_detection))
                .map_err(io_error(&detections))?;
        }

        let descriptor_path = staging.join(DESCRIPTOR_FILE_NAME);
        fs::write(&descriptor_path, descriptor.to_ini()).map_err(io_error(&descriptor_path))?;

        let directory = self.sequence_directory(sequence);
        if directory.exists() {
            debug!("Replacing previous output at {}", directory.display());
            fs::remove_dir_all(&directory).map_err(io_error(&directory))?;
        }
        fs::rename(&staging, &directory).map_err(io_error(&directory))?;

        info!(
            "Wrote {} with {} frames, {} rows and {} tracks",
            directory.display(),
            descriptor.length,
            serialized.rows.len(),
            serialized.tracks.len()
        );

        Ok(SequenceOutput {
            name: sequence.to_owned(),
            directory,
            frames: descriptor.length,
            rows: serialized.rows.len(),
            tracks: serialized.tracks.len(),
            warnings: serialized.warnings,
        })
    }

    fn materialize_images(
        &self,
        sequence: &str,
        frames: &ExtractedFrames,
        image_directory: &Path,
    ) -> Result<(), SerializeError> {
        let io_error = |path: &Path, source| SerializeError::Io {
            sequence: sequence.to_owned(),
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(image_directory).map_err(|e| io_error(image_directory, e))?;

        for (index, source) in frames.paths().enumerate() {
            let target = image_directory.join(format!(
                "{:0width$}.{}",
                index + 1,
                frames.extension,
                width = IMAGE_NAME_WIDTH
            ));
            match self.config.link {
                ImageLinkMethod::Copy => fs::copy(source, &target).map(|_| ()),
                ImageLinkMethod::Hardlink => fs::hard_link(source, &target),
                ImageLinkMethod::Symlink => {
                    fs::canonicalize(source).and_then(|absolute| symlink(&absolute, &target))
                },
            }
            .map_err(|e| io_error(&target, e))?;
        }
        trace!("Linked {} frames into {}", frames.len(), image_directory.display());

        Ok(())
    }

    /// Removes a sequence's output and staging directories, if present.
    #[inline]
    pub fn remove_output(&self, sequence: &str) {
        for directory in [self.sequence_directory(sequence), self.staging_directory(sequence)] {
            if directory.exists() {
                match fs::remove_dir_all(&directory) {
                    Ok(()) => debug!("Removed {}", directory.display()),
                    Err(err) => warn!("Failed to remove {}: {}", directory.display(), err),
                }
            }
        }
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    fs::copy(original, link).map(|_| ())
}

/// A sequence directory that was written successfully.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceOutput {
    pub name:      String,
    pub directory: PathBuf,
    pub frames:    usize,
    pub rows:      usize,
    pub tracks:    usize,
    pub warnings:  Vec<SequenceWarning>,
}

/// Conditions worth tuning annotation density or extraction for, which do not
/// stop a sequence from being written.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum SequenceWarning {
    #[error(transparent)]
    AlignmentAmbiguity(#[from] AlignmentAmbiguityWarning),
    #[error(transparent)]
    UntimedImages(#[from] UntimedImagesWarning),
    #[error(
        "Sequence {sequence} frame {frame}: track {track} appears more than once on image \
         {image}, keeping annotation {kept}"
    )]
    DuplicateTrack {
        sequence: String,
        frame:    usize,
        track:    RecordId,
        image:    RecordId,
        kept:     RecordId,
    },
    #[error("Frames of {sequence} are not numbered 1..={count}")]
    SparseFrameNumbering { sequence: String, count: usize },
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    MissingFrames(#[from] MissingFramesError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Failed to write {sequence} at {path}: {source}")]
    Io {
        sequence: String,
        path:     PathBuf,
        source:   std::io::Error,
    },
}
