use std::{
    collections::{HashMap, hash_map::Entry},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use serde_json::Map;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::export::{
    Annotation,
    AnnotationExport,
    Category,
    Image,
    RecordId,
    Video,
};

/// Label Studio prefixes uploads with a short hash: `1a2b3c4d-original.mp4`
static UPLOAD_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{8}-(.+)$").expect("valid regex"));

/// All annotations of one source video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUnit {
    /// Grouping key the images resolved to, usually the video path
    pub key:           String,
    pub sequence_name: String,
    pub images:        Vec<Image>,
    pub annotations:   Vec<Annotation>,
    pub categories:    Vec<Category>,
}

impl VideoUnit {
    #[inline]
    pub fn to_export(&self) -> AnnotationExport {
        AnnotationExport {
            images:      self.images.clone(),
            annotations: self.annotations.clone(),
            categories:  self.categories.clone(),
            videos:      Vec::new(),
            extra:       Map::new(),
        }
    }

    #[inline]
    pub fn file_name(&self) -> String {
        format!("{}_coco.json", self.sequence_name)
    }

    /// Writes the unit as a standalone COCO document into `directory`.
    #[inline]
    pub fn save(&self, directory: &Path) -> Result<PathBuf> {
        let path = directory.join(self.file_name());
        let temp = path.with_extension("temp.json");
        let mut buffer = vec![];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.to_export().serialize(&mut serializer)?;
        std::fs::write(&temp, buffer)?;
        std::fs::rename(&temp, &path)?;

        Ok(path)
    }
}

/// Per-video units in the order their videos first appear in the export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    units: Vec<VideoUnit>,
}

impl Partition {
    #[inline]
    pub fn units(&self) -> &[VideoUnit] {
        &self.units
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&VideoUnit> {
        self.units.iter().find(|unit| unit.key == key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[inline]
    pub fn save_all(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(directory)?;
        let mut outputs = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            let output = unit.save(directory)?;
            debug!("Wrote {} images of {} to {}", unit.images.len(), unit.key, output.display());
            outputs.push(output);
        }

        Ok(outputs)
    }
}

/// Splits an export into one unit per source video.
///
/// Any image that cannot be attributed to a video, or annotation that points
/// at a missing image, rejects the whole export.
#[inline]
pub fn partition(export: &AnnotationExport) -> Result<Partition, MalformedExportError> {
    let videos: HashMap<&RecordId, &Video> =
        export.videos.iter().map(|video| (&video.id, video)).collect();
    let mut units: Vec<VideoUnit> = Vec::new();
    let mut unit_by_key: HashMap<String, usize> = HashMap::new();
    let mut unit_by_name: HashMap<String, usize> = HashMap::new();
    let mut unit_by_image: HashMap<&RecordId, usize> = HashMap::with_capacity(export.images.len());

    for image in &export.images {
        let video = video_key(image, &videos)?;
        let index = match unit_by_key.get(video.as_str()) {
            Some(index) => *index,
            None => {
                let name = video.sequence_name().ok_or_else(|| {
                    MalformedExportError::UnnamedSequence {
                        key: video.as_str().to_owned(),
                    }
                })?;
                let key = video.into_string();
                let index = units.len();
                match unit_by_name.entry(name.clone()) {
                    Entry::Occupied(existing) => {
                        return Err(MalformedExportError::SequenceNameCollision {
                            name,
                            first: units[*existing.get()].key.clone(),
                            second: key,
                        });
                    },
                    Entry::Vacant(slot) => {
                        slot.insert(index);
                    },
                }
                units.push(VideoUnit {
                    key:           key.clone(),
                    sequence_name: name,
                    images:        Vec::new(),
                    annotations:   Vec::new(),
                    categories:    export.categories.clone(),
                });
                unit_by_key.insert(key, index);
                index
            },
        };

        if unit_by_image.insert(&image.id, index).is_some() {
            return Err(MalformedExportError::DuplicateImage {
                image: image.id.clone(),
            });
        }
        units[index].images.push(image.clone());
    }

    for annotation in &export.annotations {
        let index = unit_by_image.get(&annotation.image_id).ok_or_else(|| {
            MalformedExportError::DanglingAnnotation {
                annotation: annotation.id.clone(),
                image:      annotation.image_id.clone(),
            }
        })?;
        units[*index].annotations.push(annotation.clone());
    }

    info!(
        "Partitioned {} images and {} annotations into {} videos",
        export.images.len(),
        export.annotations.len(),
        units.len()
    );

    Ok(Partition {
        units,
    })
}

/// Grouping key of a video, remembering whether it names a video file or the
/// directory its images were stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoKey {
    File(String),
    Directory(String),
}

impl VideoKey {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            VideoKey::File(key) | VideoKey::Directory(key) => key,
        }
    }

    #[inline]
    pub fn into_string(self) -> String {
        match self {
            VideoKey::File(key) | VideoKey::Directory(key) => key,
        }
    }

    /// Only file keys lose their extension, a dot in a directory name is
    /// part of the name.
    #[inline]
    pub fn sequence_name(&self) -> Option<String> {
        match self {
            VideoKey::File(key) => sequence_name(key),
            VideoKey::Directory(key) => {
                strip_upload_prefix(last_component(key).map(str::to_owned)?)
            },
        }
    }
}

/// Resolves the video an image belongs to.
#[inline]
pub fn video_key(
    image: &Image,
    videos: &HashMap<&RecordId, &Video>,
) -> Result<VideoKey, MalformedExportError> {
    if let Some(video) = image.video.as_deref().filter(|video| !video.is_empty()) {
        return Ok(VideoKey::File(video.to_owned()));
    }
    if let Some(video_id) = &image.video_id {
        let video = videos.get(video_id).ok_or_else(|| MalformedExportError::UnknownVideo {
            image: image.id.clone(),
            video: video_id.clone(),
        })?;
        return Ok(VideoKey::File(if video.name.is_empty() {
            format!("video-{}", video.id)
        } else {
            video.name.clone()
        }));
    }
    // `data/clip.mp4#t=12.3`
    if let Some((video, _)) = image.file_name.split_once('#')
        && !video.is_empty()
    {
        return Ok(VideoKey::File(video.to_owned()));
    }
    // `seq01/000012.jpg`
    if let Some((directory, _)) = image.file_name.rsplit_once(['/', '\\'])
        && !directory.is_empty()
    {
        return Ok(VideoKey::Directory(directory.to_owned()));
    }

    Err(MalformedExportError::UnresolvableImage {
        image:     image.id.clone(),
        file_name: image.file_name.clone(),
    })
}

/// Derives a directory-safe sequence name from a video file key: the file
/// stem of its last path component with any upload prefix removed.
#[inline]
pub fn sequence_name(key: &str) -> Option<String> {
    let last = last_component(key)?;
    let stem = Path::new(last).file_stem()?.to_string_lossy();
    strip_upload_prefix(stem.into_owned())
}

fn last_component(key: &str) -> Option<&str> {
    let key = key.split(['?', '#']).next()?;
    key.trim_end_matches(['/', '\\']).rsplit(['/', '\\']).next()
}

fn strip_upload_prefix(name: String) -> Option<String> {
    let name = UPLOAD_PREFIX
        .captures(&name)
        .and_then(|captures| captures.get(1))
        .map_or_else(|| name.clone(), |original| original.as_str().to_owned());

    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

#[derive(Debug, Clone, Error)]
pub enum MalformedExportError {
    #[error("Image {image} appears more than once")]
    DuplicateImage { image: RecordId },
    #[error("Image {image} ({file_name:?}) cannot be attributed to a video")]
    UnresolvableImage { image: RecordId, file_name: String },
    #[error("Image {image} references unknown video {video}")]
    UnknownVideo { image: RecordId, video: RecordId },
    #[error("Annotation {annotation} references missing image {image}")]
    DanglingAnnotation {
        annotation: RecordId,
        image:      RecordId,
    },
    #[error("Video {key:?} does not yield a sequence name")]
    UnnamedSequence { key: String },
    #[error("Videos {first:?} and {second:?} both map to sequence {name:?}")]
    SequenceNameCollision {
        name:   String,
        first:  String,
        second: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn image(id: i64, file_name: &str) -> Image {
        Image::new(id, file_name)
    }

    fn sample_export() -> AnnotationExport {
        AnnotationExport {
            images: vec![
                image(1, "clips/a.mp4#t=0.0"),
                image(2, "clips/b.mp4#t=0.0"),
                image(3, "clips/a.mp4#t=1.0"),
                image(4, "clips/b.mp4#t=1.0"),
                image(5, "clips/a.mp4#t=2.0"),
            ],
            annotations: vec![
                Annotation::new(10, 1, [0.0, 0.0, 1.0, 1.0]).with_track(1),
                Annotation::new(11, 4, [0.0, 0.0, 1.0, 1.0]).with_track(2),
                Annotation::new(12, 5, [0.0, 0.0, 1.0, 1.0]).with_track(1),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn every_image_lands_in_exactly_one_unit() {
        let export = sample_export();
        let partition = partition(&export).unwrap();

        let mut seen = HashSet::new();
        for unit in partition.units() {
            for image in &unit.images {
                assert!(seen.insert(image.id.clone()), "{} duplicated", image.id);
            }
        }
        let expected = export.images.iter().map(|i| i.id.clone()).collect::<HashSet<_>>();
        assert_eq!(seen, expected);
    }

    #[test]
    fn units_keep_export_order() {
        let partition = partition(&sample_export()).unwrap();

        let keys = partition.units().iter().map(|u| u.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, ["clips/a.mp4", "clips/b.mp4"]);

        let a = partition.get("clips/a.mp4").unwrap();
        let ids = a.images.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, [RecordId::from(1), RecordId::from(3), RecordId::from(5)]);
        assert_eq!(a.sequence_name, "a");
        assert_eq!(a.annotations.len(), 2);
        assert_eq!(partition.get("clips/b.mp4").unwrap().annotations.len(), 1);
    }

    #[test]
    fn partitioning_is_deterministic() {
        let export = sample_export();
        assert_eq!(partition(&export).unwrap(), partition(&export).unwrap());
    }

    #[test]
    fn unresolvable_image_rejects_export() {
        let mut export = sample_export();
        export.images.push(image(6, "000001.jpg"));

        let err = partition(&export).unwrap_err();
        assert!(matches!(err, MalformedExportError::UnresolvableImage { .. }));
        assert!(err.to_string().contains("000001.jpg"));
    }

    #[test]
    fn dangling_annotation_rejects_export() {
        let mut export = sample_export();
        export.annotations.push(Annotation::new(99, 42, [0.0; 4]));

        assert!(matches!(
            partition(&export),
            Err(MalformedExportError::DanglingAnnotation { .. })
        ));
    }

    #[test]
    fn duplicate_image_ids_reject_export() {
        let mut export = sample_export();
        export.images.push(image(1, "clips/b.mp4#t=3.0"));

        assert!(matches!(
            partition(&export),
            Err(MalformedExportError::DuplicateImage { .. })
        ));
    }

    #[test]
    fn colliding_sequence_names_reject_export() {
        let export = AnnotationExport {
            images: vec![image(1, "day1/match.mp4#t=0"), image(2, "day2/match.mp4#t=0")],
            ..Default::default()
        };

        assert!(matches!(
            partition(&export),
            Err(MalformedExportError::SequenceNameCollision { .. })
        ));
    }

    #[test]
    fn resolves_keys_from_every_supported_hint() {
        let video = Video {
            id:    RecordId::from(3),
            name:  "videos/match.mp4".to_owned(),
            extra: Map::new(),
        };
        let videos = HashMap::from([(&video.id, &video)]);

        let mut explicit = image(1, "ignored.jpg");
        explicit.video = Some("explicit.mp4".to_owned());
        assert_eq!(video_key(&explicit, &videos).unwrap(), VideoKey::File("explicit.mp4".to_owned()));

        let mut by_id = image(2, "000001.jpg");
        by_id.video_id = Some(RecordId::from(3));
        assert_eq!(video_key(&by_id, &videos).unwrap().as_str(), "videos/match.mp4");

        by_id.video_id = Some(RecordId::from(4));
        assert!(matches!(
            video_key(&by_id, &videos),
            Err(MalformedExportError::UnknownVideo { .. })
        ));

        assert_eq!(
            video_key(&image(3, "seq01/000004.jpg"), &videos).unwrap(),
            VideoKey::Directory("seq01".to_owned())
        );
    }

    #[test]
    fn sequence_names_strip_paths_extensions_and_upload_prefixes() {
        assert_eq!(sequence_name("data/upload/3/1a2b3c4d-match.mp4").as_deref(), Some("match"));
        assert_eq!(sequence_name("match-day-2.mp4").as_deref(), Some("match-day-2"));
        assert_eq!(sequence_name("http://host/v/clip.mp4?token=x").as_deref(), Some("clip"));
        assert_eq!(sequence_name("frames/seq01/").as_deref(), Some("seq01"));
        assert_eq!(sequence_name(""), None);
    }

    #[test]
    fn directory_keys_keep_their_dots() {
        let key = VideoKey::Directory("frames/match_2024.01.05".to_owned());
        assert_eq!(key.sequence_name().as_deref(), Some("match_2024.01.05"));
        assert_eq!(VideoKey::Directory("..".to_owned()).sequence_name(), None);

        let export = AnnotationExport {
            images: vec![image(1, "cam.1/000001.jpg"), image(2, "cam.2/000001.jpg")],
            ..Default::default()
        };
        let partition = partition(&export).unwrap();
        let names = partition.units().iter().map(|u| u.sequence_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["cam.1", "cam.2"]);
    }

    #[test]
    fn saves_units_as_standalone_coco_documents() {
        let temp = tempfile::TempDir::new().unwrap();
        let partition = partition(&sample_export()).unwrap();
        let outputs = partition.save_all(temp.path()).unwrap();

        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].ends_with("a_coco.json"));
        let text = std::fs::read_to_string(&outputs[0]).unwrap();
        let reloaded: AnnotationExport = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded.images.len(), 3);
        assert_eq!(reloaded.annotations.len(), 2);
    }
}
