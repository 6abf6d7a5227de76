use std::fmt::Write as _;

use thiserror::Error;

use crate::models::{
    export::BoundingBox,
    sequence::{GroundTruthRow, GroundTruthSchema},
};

pub const GROUND_TRUTH_DIRECTORY: &str = "gt";
pub const GROUND_TRUTH_FILE_NAME: &str = "gt.txt";
pub const DETECTIONS_DIRECTORY: &str = "det";
pub const DETECTIONS_FILE_NAME: &str = "det.txt";

impl GroundTruthSchema {
    /// One `gt.txt` line, without the newline.
    #[inline]
    pub fn format_row(self, row: &GroundTruthRow) -> String {
        let GroundTruthRow {
            frame,
            track_id,
            bbox,
            category,
        } = row;
        let mut line = format!("{},{},{}", frame, track_id, format_bbox(bbox));
        // Human labels are always considered valid and fully visible
        match self {
            GroundTruthSchema::Mot16 => line.push_str(",1,-1,-1,-1"),
            GroundTruthSchema::Mot17 => {
                let class = category.as_ref().and_then(|category| category.as_number()).unwrap_or(-1);
                let _ = write!(line, ",1,{},1", class);
            },
        }
        line
    }
}

/// One `det.txt` line: the box without identity, at full confidence.
#[inline]
pub fn format_detection(row: &GroundTruthRow) -> String {
    format!("{},-1,{},1,-1,-1,-1", row.frame, format_bbox(&row.bbox))
}

/// Lines joined with `\n`, including a trailing newline when non-empty.
#[inline]
pub fn render<'a>(
    rows: impl IntoIterator<Item = &'a GroundTruthRow>,
    format: impl Fn(&GroundTruthRow) -> String,
) -> String {
    let mut text = String::new();
    for row in rows {
        text.push_str(&format(row));
        text.push('\n');
    }
    text
}

fn format_bbox(bbox: &BoundingBox) -> String {
    format!(
        "{:.2},{:.2},{:.2},{:.2}",
        bbox.x, bbox.y, bbox.width, bbox.height
    )
}

/// The fields of a `gt.txt` line that identify it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRow {
    pub frame:    i64,
    pub track_id: i64,
    pub bbox:     BoundingBox,
}

/// Parses one MOTChallenge line, `frame,id,left,top,width,height,...`
#[inline]
pub fn parse_row(line: &str) -> Result<ParsedRow, GroundTruthError> {
    let fields = line.split(',').map(str::trim).collect::<Vec<_>>();
    if fields.len() < 6 {
        return Err(GroundTruthError::TooFewFields(line.to_owned()));
    }
    let integer = |index: usize| {
        fields[index]
            .parse::<i64>()
            .map_err(|_| GroundTruthError::InvalidField(line.to_owned(), index))
    };
    let float = |index: usize| {
        fields[index]
            .parse::<f64>()
            .map_err(|_| GroundTruthError::InvalidField(line.to_owned(), index))
    };

    Ok(ParsedRow {
        frame:    integer(0)?,
        track_id: integer(1)?,
        bbox:     BoundingBox {
            x:      float(2)?,
            y:      float(3)?,
            width:  float(4)?,
            height: float(5)?,
        },
    })
}

#[derive(Debug, Clone, Error)]
pub enum GroundTruthError {
    #[error("Expected at least 6 fields in {0:?}")]
    TooFewFields(String),
    #[error("Field {1} of {0:?} is not a number")]
    InvalidField(String, usize),
}
