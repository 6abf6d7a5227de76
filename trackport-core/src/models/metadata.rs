use serde::{Deserialize, Serialize};

/// Probed properties of a source video and the rate its frames were
/// extracted at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width:             u32,
    pub height:            u32,
    pub source_frame_rate: f64,
    pub sampling_rate:     f64,
}

impl VideoMetadata {
    #[inline]
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Partially known metadata, as found in a `video.json` sidecar or in the
/// configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width:             Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height:            Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate:     Option<f64>,
    /// Extraction kept every `frame_stride`-th source frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stride:      Option<u32>,
}

impl MetadataOverrides {
    /// Fields set on `self` win over `fallback`. `sampling_rate` and
    /// `frame_stride` describe the same quantity, so they are taken together
    /// from whichever side sets either of them.
    #[inline]
    pub fn or(self, fallback: &MetadataOverrides) -> Self {
        let (sampling_rate, frame_stride) =
            if self.sampling_rate.is_some() || self.frame_stride.is_some() {
                (self.sampling_rate, self.frame_stride)
            } else {
                (fallback.sampling_rate, fallback.frame_stride)
            };
        Self {
            width: self.width.or(fallback.width),
            height: self.height.or(fallback.height),
            source_frame_rate: self.source_frame_rate.or(fallback.source_frame_rate),
            sampling_rate,
            frame_stride,
        }
    }
}
