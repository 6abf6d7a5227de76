use serde::{Deserialize, Serialize};
use strum::{Display as DisplayMacro, EnumString, IntoStaticStr};

use crate::models::export::{BoundingBox, RecordId};

pub const DEFAULT_IMAGE_DIRECTORY: &str = "img1";
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
/// Width of the zero-padded frame number in MOTChallenge image names
pub const IMAGE_NAME_WIDTH: usize = 6;

/// One tracked object at one extracted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRow {
    /// 1-based index into the extracted frame sequence
    pub frame:    usize,
    /// Dense, sequence-local track id starting at 1
    pub track_id: u32,
    pub bbox:     BoundingBox,
    pub category: Option<RecordId>,
}

/// Contents of a sequence's `seqinfo.ini`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    pub name:       String,
    pub image_dir:  String,
    pub frame_rate: f64,
    pub length:     usize,
    pub width:      u32,
    pub height:     u32,
    /// Including the leading dot, e.g. `.jpg`
    pub image_ext:  String,
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
pub enum AlignmentMode {
    /// Round to the closest extracted frame
    #[default]
    Nearest,
    /// Floor division, exact for `select=not(mod(n, stride))` extraction
    Stride,
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
pub enum GroundTruthSchema {
    /// `frame,id,left,top,width,height,1,-1,-1,-1`
    #[default]
    Mot16,
    /// `frame,id,left,top,width,height,1,class,1`
    Mot17,
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
pub enum ImageLinkMethod {
    #[default]
    Copy,
    Hardlink,
    Symlink,
}

/// Options for turning one annotation unit into a sequence directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub alignment:             AlignmentMode,
    pub schema:                GroundTruthSchema,
    pub link:                  ImageLinkMethod,
    /// Extension of extracted frames, without the dot
    pub image_extension:       String,
    /// Also write `det/det.txt`
    pub detections:            bool,
    /// Shift left/top by one pixel for tools that expect 1-based coordinates
    pub one_based_coordinates: bool,
}

impl Default for SequenceConfig {
    #[inline]
    fn default() -> Self {
        Self {
            alignment:             AlignmentMode::default(),
            schema:                GroundTruthSchema::default(),
            link:                  ImageLinkMethod::default(),
            image_extension:       DEFAULT_IMAGE_EXTENSION.to_owned(),
            detections:            true,
            one_based_coordinates: false,
        }
    }
}
