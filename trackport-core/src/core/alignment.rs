//! Mapping of annotated instants onto the extracted frame sequence.
//!
//! Annotations live on the source video's timeline while the extracted images
//! are numbered 1..=N at the sampling rate. Source frame 0 is extracted image
//! 1, so a source frame `f` lands on `f / (source_rate / sampling_rate) + 1`,
//! rounded (or floored) and clamped into the sequence.

use std::{collections::BTreeMap, sync::LazyLock};

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    core::partition::VideoUnit,
    models::{
        export::{Image, RecordId},
        metadata::VideoMetadata,
        sequence::AlignmentMode,
    },
};

/// Media fragment timestamp, `clip.mp4#t=12.3`
static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#&?]t=([0-9]+(?:\.[0-9]+)?)").expect("valid regex"));

/// Where an image sits on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePosition {
    /// 0-based source frame number
    SourceFrame(u64),
    /// Seconds from the start of the source video
    Timestamp(f64),
    /// No timing information: position of the image within its video, taken
    /// as one extracted frame per image
    Ordinal(usize),
}

impl FramePosition {
    #[inline]
    pub fn of(image: &Image, ordinal: usize) -> Self {
        if let Some(frame) = image.source_frame() {
            return FramePosition::SourceFrame(frame);
        }
        TIMESTAMP
            .captures(&image.file_name)
            .and_then(|captures| captures.get(1))
            .and_then(|seconds| seconds.as_str().parse().ok())
            .map_or(FramePosition::Ordinal(ordinal), FramePosition::Timestamp)
    }

    /// Whether the position was read from the image rather than its ordinal.
    #[inline]
    pub fn is_timed(&self) -> bool {
        !matches!(self, FramePosition::Ordinal(_))
    }

    /// 0-based, fractional position on the extraction timeline.
    #[inline]
    pub fn extraction_offset(&self, source_rate: f64, sampling_rate: f64) -> f64 {
        let ratio = sample_ratio(source_rate, sampling_rate);
        match *self {
            FramePosition::SourceFrame(frame) => frame as f64 / ratio,
            FramePosition::Timestamp(seconds) => seconds * source_rate / ratio,
            FramePosition::Ordinal(ordinal) => ordinal as f64,
        }
    }
}

/// Extracted frame (1-based) an image at `position` lands on.
#[inline]
pub fn extraction_index(
    position: FramePosition,
    source_rate: f64,
    sampling_rate: f64,
    frame_count: usize,
    mode: AlignmentMode,
) -> usize {
    mode.index(position.extraction_offset(source_rate, sampling_rate), frame_count)
}

impl AlignmentMode {
    /// Turns a 0-based extraction offset into a 1-based index within
    /// `1..=frame_count`.
    #[inline]
    pub fn index(self, offset: f64, frame_count: usize) -> usize {
        let offset = match self {
            AlignmentMode::Nearest => offset.round(),
            AlignmentMode::Stride => offset.floor(),
        };
        let last = frame_count.max(1);
        if !offset.is_finite() || offset < 0.0 {
            return 1;
        }
        // Saturating float to integer conversion keeps huge offsets in range
        (offset as usize).saturating_add(1).min(last)
    }
}

/// Source frames per extracted frame. Rates are validated before alignment,
/// the fallback only keeps this total.
fn sample_ratio(source_rate: f64, sampling_rate: f64) -> f64 {
    let ratio = source_rate / sampling_rate;
    if ratio.is_finite() && ratio > 0.0 { ratio } else { 1.0 }
}

/// Winning image for every extracted frame that received one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    /// Extracted frame index to position in `VideoUnit::images`
    pub frames:     BTreeMap<usize, usize>,
    pub collisions: Vec<AlignmentAmbiguityWarning>,
    pub untimed:    Option<UntimedImagesWarning>,
}

/// Maps every image of `unit` onto the extracted frames.
///
/// Images are visited in source-timeline order (export order breaks ties) and
/// a later image replaces an earlier one on the same extracted frame. Image
/// order stands in for timing only when no image of the unit has a position
/// of its own, otherwise images without one are skipped.
#[inline]
pub fn align(
    unit: &VideoUnit,
    metadata: &VideoMetadata,
    frame_count: usize,
    mode: AlignmentMode,
) -> Alignment {
    let (source_rate, sampling_rate) = (metadata.source_frame_rate, metadata.sampling_rate);
    let positions = unit
        .images
        .iter()
        .enumerate()
        .map(|(ordinal, image)| (ordinal, FramePosition::of(image, ordinal)))
        .collect::<Vec<_>>();
    let timed = positions.iter().any(|(_, position)| position.is_timed());
    let (positioned, skipped): (Vec<_>, Vec<_>) =
        positions.into_iter().partition(|(_, position)| !timed || position.is_timed());

    let untimed = (!skipped.is_empty()).then(|| {
        let warning = UntimedImagesWarning {
            sequence: unit.sequence_name.clone(),
            images:   skipped.iter().map(|(ordinal, _)| unit.images[*ordinal].id.clone()).collect(),
        };
        warn!("{}", warning);
        warning
    });

    let timeline = positioned
        .into_iter()
        .map(|(ordinal, position)| {
            (ordinal, position, position.extraction_offset(source_rate, sampling_rate))
        })
        .sorted_by(|(a_ordinal, _, a), (b_ordinal, _, b)| {
            a.total_cmp(b).then(a_ordinal.cmp(b_ordinal))
        });

    let mut frames = BTreeMap::new();
    let mut overridden: BTreeMap<usize, Vec<RecordId>> = BTreeMap::new();
    for (ordinal, position, _) in timeline {
        let frame = extraction_index(position, source_rate, sampling_rate, frame_count, mode);
        if let Some(previous) = frames.insert(frame, ordinal) {
            overridden.entry(frame).or_default().push(unit.images[previous].id.clone());
        }
    }

    let collisions = overridden
        .into_iter()
        .map(|(frame, overridden)| {
            let warning = AlignmentAmbiguityWarning {
                sequence: unit.sequence_name.clone(),
                frame,
                kept: unit.images[frames[&frame]].id.clone(),
                overridden,
            };
            warn!("{}", warning);
            warning
        })
        .collect();

    Alignment {
        frames,
        collisions,
        untimed,
    }
}

/// Several images collapsed onto one extracted frame; only `kept` is used.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error(
    "Sequence {sequence} frame {frame}: image {kept} overrides {}",
    .overridden.iter().join(", ")
)]
pub struct AlignmentAmbiguityWarning {
    pub sequence:   String,
    pub frame:      usize,
    pub kept:       RecordId,
    pub overridden: Vec<RecordId>,
}

/// Images without a timeline position in a unit where others have one.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error(
    "Sequence {sequence}: images {} have no frame position and were left out",
    .images.iter().join(", ")
)]
pub struct UntimedImagesWarning {
    pub sequence: String,
    pub images:   Vec<RecordId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(source_frame_rate: f64, sampling_rate: f64) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            source_frame_rate,
            sampling_rate,
        }
    }

    fn unit(images: Vec<Image>) -> VideoUnit {
        VideoUnit {
            key: "clip.mp4".to_owned(),
            sequence_name: "clip".to_owned(),
            images,
            annotations: Vec::new(),
            categories: Vec::new(),
        }
    }

    fn at_frame(id: i64, frame: u64) -> Image {
        let mut image = Image::new(id, "clip.mp4");
        image.frame_index = Some(frame);
        image
    }

    fn nearest(frame: u64, frame_count: usize) -> usize {
        extraction_index(
            FramePosition::SourceFrame(frame),
            30.0,
            1.0,
            frame_count,
            AlignmentMode::Nearest,
        )
    }

    #[test]
    fn one_sample_per_second_maps_whole_seconds() {
        assert_eq!(nearest(0, 2), 1);
        assert_eq!(nearest(30, 2), 2);
    }

    #[test]
    fn rounds_to_nearest_extracted_frame() {
        assert_eq!(nearest(14, 10), 1);
        assert_eq!(nearest(16, 10), 2);
        assert_eq!(nearest(44, 10), 2);
    }

    #[test]
    fn clamps_into_the_sequence() {
        assert_eq!(nearest(3000, 5), 5);
        assert_eq!(AlignmentMode::Nearest.index(-10.0, 5), 1);
        assert_eq!(AlignmentMode::Nearest.index(f64::NAN, 5), 1);
        assert_eq!(AlignmentMode::Stride.index(f64::INFINITY, 5), 1);
    }

    #[test]
    fn stride_mode_floors() {
        let position = FramePosition::SourceFrame(47);
        assert_eq!(extraction_index(position, 24.0, 1.0, 10, AlignmentMode::Stride), 2);
        assert_eq!(extraction_index(position, 24.0, 1.0, 10, AlignmentMode::Nearest), 3);
    }

    #[test]
    fn positions_come_from_frame_index_then_timestamp_then_order() {
        assert_eq!(FramePosition::of(&at_frame(1, 45), 0).extraction_offset(30.0, 2.0), 3.0);

        let stamped = Image::new(2, "clip.mp4#t=2.5");
        assert_eq!(FramePosition::of(&stamped, 7), FramePosition::Timestamp(2.5));
        assert_eq!(FramePosition::of(&stamped, 7).extraction_offset(30.0, 2.0), 5.0);

        let bare = Image::new(3, "seq/000004.jpg");
        assert_eq!(FramePosition::of(&bare, 3), FramePosition::Ordinal(3));
        assert!(!FramePosition::of(&bare, 3).is_timed());
        assert_eq!(FramePosition::of(&bare, 3).extraction_offset(30.0, 2.0), 3.0);
    }

    #[test]
    fn aligns_sparse_keyframes() {
        let unit = unit(vec![at_frame(1, 0), at_frame(2, 30)]);
        let alignment = align(&unit, &metadata(30.0, 1.0), 2, AlignmentMode::Nearest);

        assert_eq!(alignment.frames, BTreeMap::from([(1, 0), (2, 1)]));
        assert!(alignment.collisions.is_empty());
    }

    #[test]
    fn later_image_overrides_on_collision() {
        // Export order is deliberately not timeline order
        let unit = unit(vec![at_frame(2, 40), at_frame(1, 20), at_frame(3, 90)]);
        let alignment = align(&unit, &metadata(30.0, 1.0), 5, AlignmentMode::Nearest);

        assert_eq!(alignment.frames, BTreeMap::from([(2, 0), (4, 2)]));
        assert_eq!(alignment.collisions.len(), 1);
        let collision = &alignment.collisions[0];
        assert_eq!(collision.frame, 2);
        assert_eq!(collision.kept, RecordId::from(2));
        assert_eq!(collision.overridden, [RecordId::from(1)]);
        assert!(collision.to_string().contains("overrides 1"));
    }

    #[test]
    fn equal_positions_fall_back_to_export_order() {
        let unit = unit(vec![at_frame(5, 30), at_frame(6, 30)]);
        let alignment = align(&unit, &metadata(30.0, 1.0), 3, AlignmentMode::Nearest);

        assert_eq!(alignment.frames, BTreeMap::from([(2, 1)]));
        assert_eq!(alignment.collisions[0].kept, RecordId::from(6));
    }

    #[test]
    fn image_order_places_untimed_units() {
        let unit = unit((1..=3).map(|id| Image::new(id, "seq/frame.jpg")).collect());
        let alignment = align(&unit, &metadata(30.0, 1.0), 3, AlignmentMode::Nearest);

        assert_eq!(alignment.frames, BTreeMap::from([(1, 0), (2, 1), (3, 2)]));
        assert!(alignment.untimed.is_none());
    }

    #[test]
    fn untimed_images_are_skipped_next_to_timed_ones() {
        let unit = unit(vec![Image::new(1, "seq/frame.jpg"), at_frame(2, 60), at_frame(3, 0)]);
        let alignment = align(&unit, &metadata(30.0, 1.0), 3, AlignmentMode::Nearest);

        assert_eq!(alignment.frames, BTreeMap::from([(1, 2), (3, 1)]));
        assert!(alignment.collisions.is_empty());
        let untimed = alignment.untimed.unwrap();
        assert_eq!(untimed.images, [RecordId::from(1)]);
        assert!(untimed.to_string().contains("images 1 have no frame position"));
    }
}
