use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::UPLOAD_EXTENSIONS;
use crate::database::{Database, NewRecord, RecordSummary};
use crate::detection::{summarize, CategorySet, Detector};
use crate::exif_parser::{gps_coordinate, read_metadata};
use crate::image_processing::render_annotated;
use crate::location::{resolve_coordinate, ClientCoordinate};

/// Result of one upload, ready to be rendered back to the browser.
#[derive(Debug, Clone)]
pub struct ProcessedUpload {
    pub record: RecordSummary,
    pub annotated_jpeg: Vec<u8>,
}

/// Runs the whole upload flow: save, read GPS, detect, count, store.
pub struct UploadProcessor {
    db: Database,
    detector: Arc<dyn Detector>,
    categories: CategorySet,
    upload_dir: PathBuf,
    result_dir: PathBuf,
}

impl UploadProcessor {
    pub fn new(
        db: Database,
        detector: Arc<dyn Detector>,
        categories: CategorySet,
        upload_dir: PathBuf,
        result_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            detector,
            categories,
            upload_dir,
            result_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.result_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Geolocation never blocks an upload: a picture without usable GPS data
    /// is stored with an absent coordinate. Detector and storage failures do
    /// abort it.
    pub fn process(
        &self,
        client_name: &str,
        bytes: &[u8],
        client: &ClientCoordinate,
    ) -> Result<ProcessedUpload> {
        let stem = Uuid::new_v4().simple().to_string();
        let filename = format!("{}.{}", stem, stored_extension(client_name));
        let upload_path = self.upload_dir.join(&filename);
        std::fs::write(&upload_path, bytes)
            .with_context(|| format!("Failed to save upload {}", upload_path.display()))?;

        let metadata = read_metadata(&upload_path);
        let exif_coordinate = gps_coordinate(&metadata);

        let result_path = self.result_dir.join(format!("{stem}.jpg"));
        let detections = self
            .detector
            .detect(&upload_path, &result_path)
            .with_context(|| format!("Detection failed for {}", filename))?;

        let annotated_jpeg = render_annotated(&upload_path, &detections)?;
        std::fs::write(&result_path, &annotated_jpeg)
            .with_context(|| format!("Failed to save result {}", result_path.display()))?;

        let summary = summarize(&detections.labels, &self.categories);
        let location = resolve_coordinate(client, exif_coordinate);

        let record = self.db.insert(&NewRecord {
            filename,
            image: annotated_jpeg.clone(),
            summary,
            location,
        })?;

        tracing::info!(
            id = record.id,
            file = %record.filename,
            total = record.summary.total,
            recognized = record.summary.recognized(),
            location = %record.coordinate,
            "Processed upload ({} metadata tags)",
            metadata.len()
        );

        Ok(ProcessedUpload {
            record,
            annotated_jpeg,
        })
    }
}

/// Keeps a known image extension from the client's filename, lowercased;
/// everything else is stored as `.jpg`.
pub fn stored_extension(client_name: &str) -> String {
    Path::new(client_name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .filter(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "jpg".to_string())
}
