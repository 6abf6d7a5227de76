use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display as DisplayMacro, EnumString, IntoStaticStr};

/// Identifier of an export record. Exports key records by integers (COCO) or
/// by strings (Label Studio region ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    #[inline]
    pub fn as_number(&self) -> Option<i64> {
        match self {
            RecordId::Number(number) => Some(*number),
            RecordId::Text(text) => text.parse().ok(),
        }
    }
}

impl fmt::Display for RecordId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(number) => write!(f, "{}", number),
            RecordId::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for RecordId {
    #[inline]
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

impl From<&str> for RecordId {
    #[inline]
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_owned())
    }
}

impl From<String> for RecordId {
    #[inline]
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

/// A combined annotation export covering any number of videos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationExport {
    pub images:      Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories:  Vec<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos:      Vec<Video>,
    /// `info`, `licenses` and anything else the tool wrote
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

/// One annotated instant of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id:          RecordId,
    #[serde(default)]
    pub file_name:   String,
    /// Explicit grouping key, takes precedence over every other video hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video:       Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id:    Option<RecordId>,
    /// 0-based frame number in the source video's own timeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    /// Same as `frame_index`, under the names other tools write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id:    Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame:       Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width:       Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height:      Option<u32>,
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

impl Image {
    #[inline]
    pub fn new(id: impl Into<RecordId>, file_name: &str) -> Self {
        Self {
            id:          id.into(),
            file_name:   file_name.to_owned(),
            video:       None,
            video_id:    None,
            frame_index: None,
            frame_id:    None,
            frame:       None,
            width:       None,
            height:      None,
            extra:       Map::new(),
        }
    }

    /// Source frame of the image, preferring `frame_index` over `frame_id`
    /// over `frame`.
    #[inline]
    pub fn source_frame(&self) -> Option<u64> {
        self.frame_index.or(self.frame_id).or(self.frame)
    }

    #[inline]
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id:          RecordId,
    pub image_id:    RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    pub bbox:        BoundingBox,
    #[serde(default, alias = "instance_id", skip_serializing_if = "Option::is_none")]
    pub track_id:    Option<RecordId>,
    #[serde(default, skip_serializing_if = "BoxUnits::is_pixels")]
    pub bbox_units:  BoxUnits,
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

impl Annotation {
    #[inline]
    pub fn new(id: impl Into<RecordId>, image_id: impl Into<RecordId>, bbox: [f64; 4]) -> Self {
        Self {
            id:          id.into(),
            image_id:    image_id.into(),
            category_id: None,
            bbox:        BoundingBox::from(bbox),
            track_id:    None,
            bbox_units:  BoxUnits::Pixels,
            extra:       Map::new(),
        }
    }

    #[inline]
    pub fn with_track(mut self, track_id: impl Into<RecordId>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    /// Identity of the physical object this box belongs to.
    ///
    /// Falls back to `attributes.track_id` (CVAT-style exports) and finally to
    /// the annotation id, which makes every box its own track.
    #[inline]
    pub fn source_track(&self) -> RecordId {
        if let Some(track_id) = &self.track_id {
            return track_id.clone();
        }
        let attribute = self
            .extra
            .get("attributes")
            .and_then(|attributes| attributes.get("track_id"))
            .and_then(|value| serde_json::from_value::<RecordId>(value.clone()).ok());

        attribute.unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id:    RecordId,
    #[serde(default)]
    pub name:  String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id:    RecordId,
    #[serde(default, alias = "file_name")]
    pub name:  String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Axis-aligned box, top-left corner plus size. Serialized as COCO's
/// `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x:      f64,
    pub y:      f64,
    pub width:  f64,
    pub height: f64,
}

impl BoundingBox {
    #[inline]
    pub fn scaled(&self, x_scale: f64, y_scale: f64) -> Self {
        Self {
            x:      self.x * x_scale,
            y:      self.y * y_scale,
            width:  self.width * x_scale,
            height: self.height * y_scale,
        }
    }

    #[inline]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

impl From<[f64; 4]> for BoundingBox {
    #[inline]
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    #[inline]
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x, bbox.y, bbox.width, bbox.height]
    }
}

/// Coordinate space of a stored box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxUnits {
    #[default]
    Pixels,
    /// 0..100 of the frame's width and height
    Percent,
}

impl BoxUnits {
    #[inline]
    pub fn is_pixels(&self) -> bool {
        matches!(self, BoxUnits::Pixels)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    DisplayMacro,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExportFormat {
    /// Sniff the document shape
    #[default]
    Auto,
    Coco,
    LabelStudio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_coco_fields_and_keeps_unknown_ones() {
        let image: Image = serde_json::from_str(
            r#"{"id": 7, "file_name": "clip.mp4#t=1.5", "frame_id": 45, "width": 640, "height": 360, "license": 2}"#,
        )
        .unwrap();

        assert_eq!(image.id, RecordId::Number(7));
        assert_eq!(image.source_frame(), Some(45));
        assert_eq!(image.resolution(), Some((640, 360)));
        assert_eq!(image.extra.get("license"), Some(&Value::from(2)));
    }

    #[test]
    fn frame_index_wins_over_other_frame_fields() {
        let image: Image = serde_json::from_str(
            r#"{"id": 1, "file_name": "a/000001.jpg", "frame_index": 0, "frame_id": 1, "frame": 2}"#,
        )
        .unwrap();
        assert_eq!(image.source_frame(), Some(0));

        let image: Image =
            serde_json::from_str(r#"{"id": 2, "file_name": "a/000002.jpg", "frame": 12}"#).unwrap();
        assert_eq!(image.source_frame(), Some(12));
    }

    #[test]
    fn bbox_serializes_as_coco_array() {
        let annotation = Annotation::new(1, 2, [1.0, 2.0, 3.0, 4.0]);
        let value = serde_json::to_value(&annotation).unwrap();

        assert_eq!(value["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(value.get("bbox_units").is_none());
    }

    #[test]
    fn source_track_prefers_track_id_then_attributes_then_id() {
        let plain = Annotation::new(10, 1, [0.0; 4]);
        assert_eq!(plain.source_track(), RecordId::Number(10));

        let mut cvat = Annotation::new(11, 1, [0.0; 4]);
        cvat.extra.insert("attributes".to_owned(), serde_json::json!({"track_id": 3}));
        assert_eq!(cvat.source_track(), RecordId::Number(3));

        let tracked = cvat.with_track("car-1");
        assert_eq!(tracked.source_track(), RecordId::from("car-1"));
    }

    #[test]
    fn instance_id_is_an_alias_for_track_id() {
        let annotation: Annotation = serde_json::from_str(
            r#"{"id": "a", "image_id": "b", "bbox": [0, 0, 1, 1], "instance_id": 4}"#,
        )
        .unwrap();

        assert_eq!(annotation.track_id, Some(RecordId::Number(4)));
    }
}
