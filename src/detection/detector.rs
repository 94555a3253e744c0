use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub class_id: u32,
    #[serde(default)]
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// What the model prints: class names keyed by id, plus the boxes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetections {
    #[serde(default)]
    pub names: HashMap<String, String>,
    #[serde(default)]
    pub boxes: Vec<DetectionBox>,
}

impl RawDetections {
    pub fn label_for(&self, class_id: u32) -> String {
        self.names
            .get(&class_id.to_string())
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    /// Keeps the detector's order and drops anything past `max_detections`.
    pub fn into_output(mut self, max_detections: usize, annotated: Option<PathBuf>) -> DetectorOutput {
        self.boxes.truncate(max_detections);
        let labels = self.boxes.iter().map(|b| self.label_for(b.class_id)).collect();
        DetectorOutput {
            boxes: self.boxes,
            labels,
            annotated,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectorOutput {
    pub boxes: Vec<DetectionBox>,
    /// One label per box, same order
    pub labels: Vec<String>,
    /// Overlay rendered by the model, if it wrote one
    pub annotated: Option<PathBuf>,
}

pub trait Detector: Send + Sync {
    /// Runs the model on `image`. The model may write its own overlay to
    /// `annotated_out`.
    fn detect(&self, image: &Path, annotated_out: &Path) -> Result<DetectorOutput>;
}

/// Runs an external program as
/// `<program> <args...> <image> <annotated_out> <max_detections>` and parses
/// the last non-empty line of its stdout as [`RawDetections`] JSON.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    max_detections: usize,
}

impl CommandDetector {
    pub fn new(command_line: &str, max_detections: usize) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("Detector command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            max_detections,
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Detector for CommandDetector {
    fn detect(&self, image: &Path, annotated_out: &Path) -> Result<DetectorOutput> {
        let started = std::time::Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .arg(annotated_out)
            .arg(self.max_detections.to_string())
            .output()
            .with_context(|| format!("Failed to start detector: {}", self.command_line()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Detector exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Detector printed nothing"))?;
        let raw: RawDetections =
            serde_json::from_str(json_line).context("Detector output is not valid JSON")?;

        let annotated = annotated_out.is_file().then(|| annotated_out.to_path_buf());
        let result = raw.into_output(self.max_detections, annotated);
        tracing::debug!(
            "Detector found {} objects in {} ({:?})",
            result.labels.len(),
            image.display(),
            started.elapsed()
        );
        Ok(result)
    }
}
