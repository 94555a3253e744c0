pub mod detector;
pub mod summary;

pub use detector::{CommandDetector, DetectionBox, Detector, DetectorOutput};
pub use summary::{summarize, CategoryCount, CategorySet, DetectionSummary};
