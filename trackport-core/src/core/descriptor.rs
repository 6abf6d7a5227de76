//! `seqinfo.ini` reading and writing.
//!
//! ```ini
//! [Sequence]
//! name=MOT17-02
//! imDir=img1
//! frameRate=30
//! seqLength=600
//! imWidth=1920
//! imHeight=1080
//! imExt=.jpg
//! ```

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::models::sequence::SequenceDescriptor;

pub const DESCRIPTOR_FILE_NAME: &str = "seqinfo.ini";
const SECTION: &str = "[Sequence]";

impl SequenceDescriptor {
    #[inline]
    pub fn to_ini(&self) -> String {
        let mut ini = String::new();
        ini.push_str(SECTION);
        ini.push('\n');
        for (key, value) in [
            ("name", self.name.clone()),
            ("imDir", self.image_dir.clone()),
            ("frameRate", format_rate(self.frame_rate)),
            ("seqLength", self.length.to_string()),
            ("imWidth", self.width.to_string()),
            ("imHeight", self.height.to_string()),
            ("imExt", self.image_ext.clone()),
        ] {
            let _ = writeln!(ini, "{}={}", key, value);
        }
        ini
    }

    #[inline]
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let search = |key: &'static str| {
            text.lines()
                .filter_map(|line| line.split_once('='))
                .find(|(name, _)| name.trim() == key)
                .map(|(_, value)| value.trim())
                .ok_or(DescriptorError::MissingKey(key))
        };
        let number = |key: &'static str| -> Result<u64, DescriptorError> {
            let value = search(key)?;
            value.parse().map_err(|_| DescriptorError::InvalidValue {
                key,
                value: value.to_owned(),
            })
        };
        let frame_rate = {
            let value = search("frameRate")?;
            value.parse().map_err(|_| DescriptorError::InvalidValue {
                key:   "frameRate",
                value: value.to_owned(),
            })?
        };
        let width = number("imWidth")?;
        let height = number("imHeight")?;

        Ok(Self {
            name: search("name")?.to_owned(),
            image_dir: search("imDir")?.to_owned(),
            frame_rate,
            length: number("seqLength")? as usize,
            width: u32::try_from(width).map_err(|_| DescriptorError::InvalidValue {
                key:   "imWidth",
                value: width.to_string(),
            })?,
            height: u32::try_from(height).map_err(|_| DescriptorError::InvalidValue {
                key:   "imHeight",
                value: height.to_string(),
            })?,
            image_ext: search("imExt")?.to_owned(),
        })
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// Whole rates print without a fractional part, as MOTChallenge tools expect
/// integers there.
fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 && rate.abs() < 1e15 {
        format!("{}", rate as i64)
    } else {
        format!("{}", rate)
    }
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },
    #[error("Couldn't find '{0}' in sequence descriptor")]
    MissingKey(&'static str),
    #[error("Value for '{key}' is invalid: {value}")]
    InvalidValue { key: &'static str, value: String },
}
