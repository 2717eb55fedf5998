use super::DetectionSource;
use crate::error::{CortexError, Result};
use crate::types::{Classification, DetectedRegion, Rect, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Same detections every cycle
#[derive(Debug, Clone, Default)]
pub struct StaticDetections {
    regions: Vec<DetectedRegion>,
}

impl StaticDetections {
    pub fn new(regions: Vec<DetectedRegion>) -> Self {
        Self { regions }
    }

    /// A plausible dialog for headless demos on a screen of the given size
    pub fn demo_dialog(width: f64, height: f64) -> Self {
        let cx = width / 2.0;
        let cy = height / 2.0;
        Self::new(vec![
            DetectedRegion::new(
                Rect::new(cx - 200.0, cy - 120.0, 400.0, 32.0),
                "Unsaved changes",
                92.0,
                Classification::Title,
            ),
            DetectedRegion::new(
                Rect::new(cx - 200.0, cy - 70.0, 400.0, 14.0),
                "Do you want to save the changes you made to this document?",
                88.0,
                Classification::Plain,
            ),
            DetectedRegion::new(Rect::new(cx + 60.0, cy + 40.0, 80.0, 12.0), "Save", 95.0, Classification::Button),
            DetectedRegion::new(Rect::new(cx + 150.0, cy + 40.0, 80.0, 12.0), "Cancel", 94.0, Classification::Button),
            DetectedRegion::new(
                Rect::new(20.0, 10.0, 300.0, 18.0),
                "File  Edit  View  Help",
                70.0,
                Classification::Plain,
            ),
        ])
    }
}

#[async_trait]
impl DetectionSource for StaticDetections {
    async fn next_detections(&mut self) -> Result<Vec<DetectedRegion>> {
        Ok(self.regions.clone())
    }
}

/// One detection as written by an external OCR pipeline.
///
/// Boxes use `x`/`y` or the `left`/`top` names common in OCR output. When the
/// classification is missing it is inferred from the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(alias = "left")]
    pub x: f64,
    #[serde(alias = "top")]
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_px: Option<f64>,
}

impl From<DetectionRecord> for DetectedRegion {
    fn from(record: DetectionRecord) -> Self {
        let classification = record
            .classification
            .unwrap_or_else(|| Classification::infer(&record.text));
        DetectedRegion {
            bounding_box: Rect::new(record.x, record.y, record.width, record.height),
            text: record.text,
            confidence: record.confidence,
            classification,
            font_px: record.font_px,
        }
    }
}

/// Re-reads a JSON array of [`DetectionRecord`]s on every cycle
#[derive(Debug, Clone)]
pub struct JsonDetectionFile {
    path: PathBuf,
}

impl JsonDetectionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(content: &str) -> Result<Vec<DetectedRegion>> {
        let records: Vec<DetectionRecord> = serde_json::from_str(content)?;
        Ok(records.into_iter().map(DetectedRegion::from).collect())
    }
}

#[async_trait]
impl DetectionSource for JsonDetectionFile {
    async fn next_detections(&mut self) -> Result<Vec<DetectedRegion>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CortexError::unavailable(Source::Importance, format!("{}: {}", self.path.display(), e))
        })?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_records() {
        let regions = JsonDetectionFile::parse(
            r#"[
                {"left": 10, "top": 20, "width": 100, "height": 12, "text": "Warning", "confidence": 91},
                {"x": 5, "y": 6, "width": 50, "height": 20, "text": "Go", "confidence": 60,
                 "classification": "button", "font_px": 9}
            ]"#,
        )
        .unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bounding_box, Rect::new(10.0, 20.0, 100.0, 12.0));
        assert_eq!(regions[0].classification, Classification::Error);
        assert_eq!(regions[1].classification, Classification::Button);
        assert_eq!(regions[1].font_size(), 9.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(JsonDetectionFile::parse("{not json"), Err(CortexError::Json(_))));
    }

    #[tokio::test]
    async fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"x":1,"y":2,"width":3,"height":4,"text":"OK","confidence":99}}]"#).unwrap();

        let mut source = JsonDetectionFile::new(file.path());
        let regions = source.next_detections().await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].classification, Classification::Confirmation);

        let mut missing = JsonDetectionFile::new(file.path().with_extension("missing"));
        assert!(matches!(
            missing.next_detections().await,
            Err(CortexError::SourceUnavailable { input: Source::Importance, .. })
        ));
    }

    #[tokio::test]
    async fn test_static_source_repeats() {
        let mut source = StaticDetections::demo_dialog(1920.0, 1080.0);
        let first = source.next_detections().await.unwrap();
        let second = source.next_detections().await.unwrap();
        assert_eq!(first, second);
        assert!(first.iter().any(|r| r.classification == Classification::Button));
    }
}
