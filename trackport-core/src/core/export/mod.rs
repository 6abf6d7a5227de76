use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::export::{AnnotationExport, ExportFormat};

pub mod label_studio;

/// Reads an export document from disk.
#[inline]
pub fn load_export(path: &Path, format: ExportFormat) -> Result<AnnotationExport, ExportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_export(&text, format)
}

#[inline]
pub fn parse_export(text: &str, format: ExportFormat) -> Result<AnnotationExport, ExportError> {
    let document: Value = serde_json::from_str(text)?;
    let format = match format {
        ExportFormat::Auto => detect_format(&document)?,
        explicit => explicit,
    };
    debug!("Parsing export as {}", format);

    match format {
        ExportFormat::Coco => Ok(serde_json::from_value(document)?),
        ExportFormat::LabelStudio => label_studio::from_tasks(serde_json::from_value(document)?),
        ExportFormat::Auto => unreachable!("format was detected above"),
    }
}

/// COCO documents are objects with an `images` table, Label Studio exports
/// are arrays of tasks.
#[inline]
pub fn detect_format(document: &Value) -> Result<ExportFormat, ExportError> {
    match document {
        Value::Array(_) => Ok(ExportFormat::LabelStudio),
        Value::Object(map) if map.contains_key("images") => Ok(ExportFormat::Coco),
        _ => Err(ExportError::UnrecognizedFormat),
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to read export {path}: {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse export: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Export is neither a COCO document nor a Label Studio task list")]
    UnrecognizedFormat,
    #[error("Label Studio task {task} has video regions but no data.video")]
    TaskWithoutVideo { task: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::export::RecordId;

    #[test]
    fn detects_coco_and_label_studio_documents() {
        let coco = serde_json::json!({"images": [], "annotations": []});
        let label_studio = serde_json::json!([]);

        assert_eq!(detect_format(&coco).unwrap(), ExportFormat::Coco);
        assert_eq!(detect_format(&label_studio).unwrap(), ExportFormat::LabelStudio);
        assert!(matches!(
            detect_format(&serde_json::json!({"tasks": []})),
            Err(ExportError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn parses_coco_export() {
        let text = r#"{
            "images": [{"id": 1, "file_name": "a.mp4#t=0.0"}],
            "annotations": [{"id": 5, "image_id": 1, "category_id": 2, "bbox": [1, 2, 3, 4], "track_id": 9}],
            "categories": [{"id": 2, "name": "player"}],
            "info": {"description": "export"}
        }"#;
        let export = parse_export(text, ExportFormat::Auto).unwrap();

        assert_eq!(export.images.len(), 1);
        assert_eq!(export.annotations[0].track_id, Some(RecordId::Number(9)));
        assert_eq!(export.categories[0].name, "player");
        assert!(export.extra.contains_key("info"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_export(Path::new("/nonexistent/export.json"), ExportFormat::Auto)
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/export.json"));
    }
}
