use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trackport_core::models::{
    export::ExportFormat,
    metadata::MetadataOverrides,
    sequence::SequenceConfig,
};

pub const DEFAULT_WORKERS: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub frames_root: Option<PathBuf>,
    pub output:      Option<PathBuf>,
    pub format:      ExportFormat,
    pub workers:     usize,
    #[serde(flatten)]
    pub sequence:    SequenceConfig,
    /// Used for videos without a `video.json`, or for what it leaves out
    pub metadata:    MetadataOverrides,
}

impl Default for Configuration {
    #[inline]
    fn default() -> Self {
        Self {
            frames_root: None,
            output:      None,
            format:      ExportFormat::default(),
            workers:     DEFAULT_WORKERS,
            sequence:    SequenceConfig::default(),
            metadata:    MetadataOverrides::default(),
        }
    }
}

impl Configuration {
    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        Self::save_data(self, path)?;
        Ok(())
    }

    #[inline]
    pub fn save_data(data: &Configuration, path: &Path) -> Result<(), ConfigError> {
        let mut buffer = vec![];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        data.serialize(&mut serializer).map_err(ConfigError::Serialize)?;
        let directory = path.parent();
        if let Some(directory) = directory {
            std::fs::create_dir_all(directory).map_err(ConfigError::Save)?;
        }
        std::fs::write(path, buffer).map_err(ConfigError::Save)?;
        Ok(())
    }

    #[inline]
    pub fn load(config_path: &Path) -> Result<Option<Configuration>, ConfigError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(config_path)
            .map_err(|_| ConfigError::Load(config_path.to_path_buf()))?;
        let data = serde_json::from_str(&data)
            .map_err(|_| ConfigError::Load(config_path.to_path_buf()))?;

        Ok(Some(data))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    Load(PathBuf),
    #[error("Failed to serialize config file: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to save config file: {0}")]
    Save(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use trackport_core::models::sequence::GroundTruthSchema;

    use super::*;

    #[test]
    fn saved_configuration_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("trackport.json");
        let configuration = Configuration {
            frames_root: Some(temp.path().join("frames")),
            workers: 4,
            ..Default::default()
        };

        configuration.save(&path).unwrap();
        assert_eq!(Configuration::load(&path).unwrap(), Some(configuration));
    }

    #[test]
    fn partial_files_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("trackport.json");
        std::fs::write(&path, r#"{"schema": "mot17", "metadata": {"width": 1280}}"#).unwrap();

        let configuration = Configuration::load(&path).unwrap().unwrap();
        assert_eq!(configuration.sequence.schema, GroundTruthSchema::Mot17);
        assert_eq!(configuration.sequence.image_extension, "jpg");
        assert!(configuration.sequence.detections);
        assert_eq!(configuration.metadata.width, Some(1280));
        assert_eq!(configuration.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        assert_eq!(Configuration::load(&temp.path().join("none.json")).unwrap(), None);
    }
}
