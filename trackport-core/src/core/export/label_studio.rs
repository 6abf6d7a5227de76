//! Label Studio video JSON exports.
//!
//! Each `videorectangle` region is one tracked object whose keyframes live in
//! `value.sequence`. Keyframe numbers are 1-based and boxes are percentages of
//! the frame size. Every distinct (video, keyframe) pair becomes one image of
//! the resulting export.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    core::export::ExportError,
    models::export::{
        Annotation,
        AnnotationExport,
        BoundingBox,
        BoxUnits,
        Category,
        Image,
        RecordId,
    },
};

const VIDEO_RECTANGLE: &str = "videorectangle";

#[derive(Debug, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id:          Option<RecordId>,
    #[serde(default)]
    pub data:        TaskData,
    #[serde(default)]
    pub annotations: Vec<TaskAnnotation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub video: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskAnnotation {
    #[serde(default)]
    pub result: Vec<Region>,
}

#[derive(Debug, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub id:        Option<String>,
    #[serde(default, rename = "type")]
    pub kind:      String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub to_name:   Option<String>,
    #[serde(default)]
    pub value:     RegionValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionValue {
    #[serde(default)]
    pub sequence: Vec<Keyframe>,
    #[serde(default)]
    pub labels:   Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Keyframe {
    pub frame:   u64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub x:       f64,
    pub y:       f64,
    pub width:   f64,
    pub height:  f64,
}

fn enabled_by_default() -> bool {
    true
}

#[inline]
pub fn from_tasks(tasks: Vec<Task>) -> Result<AnnotationExport, ExportError> {
    let mut export = AnnotationExport::default();
    let mut images: HashMap<(String, u64), RecordId> = HashMap::new();
    let mut categories: HashMap<String, RecordId> = HashMap::new();
    let mut video_order: HashMap<String, usize> = HashMap::new();

    for (task_index, task) in tasks.into_iter().enumerate() {
        let task_id = task.id.clone().map_or_else(|| task_index.to_string(), |id| id.to_string());
        let regions = task
            .annotations
            .into_iter()
            .flat_map(|annotation| annotation.result)
            .filter(|region| region.kind == VIDEO_RECTANGLE)
            .collect::<Vec<_>>();
        let Some(video) = task.data.video else {
            if regions.is_empty() {
                debug!("Skipping Label Studio task {} without video", task_id);
                continue;
            }
            return Err(ExportError::TaskWithoutVideo {
                task: task_id,
            });
        };
        let next_video = video_order.len();
        video_order.entry(video.clone()).or_insert(next_video);

        for region in regions {
            let track_key = region.id.clone().unwrap_or_else(|| {
                format!(
                    "{}-{}-{}",
                    task_id,
                    region.from_name.as_deref().unwrap_or_default(),
                    region.to_name.as_deref().unwrap_or_default()
                )
            });
            let category_id = region.value.labels.first().map(|label| {
                let next_id = RecordId::Number(categories.len() as i64 + 1);
                categories.entry(label.clone()).or_insert_with(|| {
                    export.categories.push(Category {
                        id:    next_id.clone(),
                        name:  label.clone(),
                        extra: Map::new(),
                    });
                    next_id
                });
                categories[label].clone()
            });

            for keyframe in region.value.sequence {
                // Disabled keyframes mark the end of a visible span
                if !keyframe.enabled {
                    trace!("Skipping disabled keyframe {} of {}", keyframe.frame, track_key);
                    continue;
                }
                let next_image = RecordId::Number(images.len() as i64 + 1);
                let image_id = images
                    .entry((video.clone(), keyframe.frame))
                    .or_insert_with(|| {
                        let mut image = Image::new(next_image.clone(), &video);
                        image.video = Some(video.clone());
                        image.frame_index = Some(keyframe.frame.saturating_sub(1));
                        export.images.push(image);
                        next_image
                    })
                    .clone();

                export.annotations.push(Annotation {
                    id: RecordId::Number(export.annotations.len() as i64 + 1),
                    image_id,
                    category_id: category_id.clone(),
                    bbox: BoundingBox {
                        x:      keyframe.x,
                        y:      keyframe.y,
                        width:  keyframe.width,
                        height: keyframe.height,
                    },
                    track_id: Some(RecordId::Text(track_key.clone())),
                    bbox_units: BoxUnits::Percent,
                    extra: Map::from_iter([(
                        "task".to_owned(),
                        Value::String(task_id.clone()),
                    )]),
                });
            }
        }
    }

    // Keyframes arrive grouped by track, the export wants each video in time order
    export.images.sort_by_key(|image| {
        let video = image.video.as_deref().unwrap_or_default();
        (
            video_order.get(video).copied().unwrap_or_default(),
            image.frame_index.unwrap_or_default(),
        )
    });

    Ok(export)
}
