//! Detection log: an append-only record of everything the pipeline accepted

use crate::error::VisionError;
use crate::models::{BoundingBox, Detection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// One accepted detection, as logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Index of the captured frame the detection came from
    pub frame_index: u64,
    pub captured_at: DateTime<Utc>,
}

impl DetectionRecord {
    pub fn new(detection: &Detection, frame_index: u64, captured_at: DateTime<Utc>) -> Self {
        Self {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox,
            frame_index,
            captured_at,
        }
    }

    /// The log line, without a trailing newline
    pub fn line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DetectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detected {} with confidence {:.2} at {}",
            self.class_name, self.confidence, self.bbox
        )
    }
}

/// In-memory detection log with on-demand persistence
#[derive(Debug, Default)]
pub struct DetectionLogger {
    records: Vec<DetectionRecord>,
}

impl DetectionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: DetectionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    /// Copy of the log for display
    pub fn snapshot(&self) -> Vec<DetectionRecord> {
        self.records.clone()
    }

    /// Full log as text, one record per line
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.records.len() * 64);
        for record in &self.records {
            out.push_str(&record.line());
            out.push('\n');
        }
        out
    }

    /// Overwrite `path` with the whole log. The in-memory log is kept either way.
    pub fn flush(&self, path: &Path) -> Result<(), VisionError> {
        write_replacing(path, self.render().as_bytes())?;
        info!("Flushed {} detection records to {:?}", self.records.len(), path);
        Ok(())
    }

    /// Overwrite `path` with the log as a JSON array
    pub fn flush_json(&self, path: &Path) -> Result<(), VisionError> {
        let body = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| VisionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        write_replacing(path, &body)?;
        info!("Flushed {} detection records as JSON to {:?}", self.records.len(), path);
        Ok(())
    }
}

/// Single write to a sibling temp file, then rename over the destination
fn write_replacing(path: &Path, body: &[u8]) -> Result<(), VisionError> {
    let flush_err = |source| VisionError::LogFlush {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| flush_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path")))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, body).map_err(flush_err)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(flush_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, confidence: f32, bbox: (i32, i32, i32, i32)) -> DetectionRecord {
        DetectionRecord {
            class_name: name.to_string(),
            confidence,
            bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            frame_index: 2,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_line_format() {
        let r = record("person", 0.876, (12, 34, 56, 78));
        assert_eq!(r.line(), "Detected person with confidence 0.88 at [12, 34, 56, 78]");
    }

    #[test]
    fn test_append_preserves_order() {
        let mut logger = DetectionLogger::new();
        logger.append(record("a", 0.9, (0, 0, 1, 1)));
        logger.append(record("b", 0.8, (0, 0, 1, 1)));
        logger.append(record("c", 0.7, (0, 0, 1, 1)));

        let names: Vec<_> = logger.snapshot().into_iter().map(|r| r.class_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flush_writes_lines_and_keeps_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection.txt");

        let mut logger = DetectionLogger::new();
        logger.append(record("dog", 0.8, (1, 2, 3, 4)));
        logger.append(record("cat", 0.55, (5, 6, 7, 8)));
        logger.flush(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Detected dog with confidence 0.80 at [1, 2, 3, 4]\n\
             Detected cat with confidence 0.55 at [5, 6, 7, 8]\n"
        );
        assert_eq!(logger.len(), 2);
        assert!(!dir.path().join("detection.txt.tmp").exists());
    }

    #[test]
    fn test_flush_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection.txt");

        let mut logger = DetectionLogger::new();
        logger.append(record("bus", 0.61, (10, 10, 90, 90)));
        logger.flush(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        logger.flush(&path).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flush_overwrites_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection.txt");
        std::fs::write(&path, "stale contents that are much longer than the log\n").unwrap();

        let mut logger = DetectionLogger::new();
        logger.append(record("cup", 0.9, (0, 0, 5, 5)));
        logger.flush(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Detected cup with confidence 0.90 at [0, 0, 5, 5]\n");
    }

    #[test]
    fn test_flush_empty_log_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection.txt");
        DetectionLogger::new().flush(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_flush_failure_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("detection.txt");

        let mut logger = DetectionLogger::new();
        logger.append(record("tv", 0.7, (0, 0, 1, 1)));

        match logger.flush(&path) {
            Err(VisionError::LogFlush { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("Expected LogFlush error, got {:?}", other),
        }
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn test_flush_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection.json");

        let mut logger = DetectionLogger::new();
        logger.append(record("kite", 0.66, (3, 4, 5, 6)));
        logger.flush_json(&path).unwrap();

        let parsed: Vec<DetectionRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, logger.snapshot());
    }
}
