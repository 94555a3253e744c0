// Server defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

// Storage locations (relative to the working directory)
pub const DEFAULT_DATABASE_PATH: &str = "nurdlemap.db";
pub const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
pub const DEFAULT_RESULT_DIR: &str = "static/results";

// Detector
pub const DEFAULT_DETECTOR_COMMAND: &str = "python3 detect.py";
pub const DEFAULT_CATEGORIES: &[&str] = &["nurdle", "bead"];
pub const DEFAULT_MAX_DETECTIONS: usize = 1500;

// Gallery and uploads
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;

// Annotated results are always stored as JPEG
pub const RESULT_JPEG_QUALITY: u8 = 90;

// Shown wherever a coordinate could not be determined
pub const NOT_AVAILABLE: &str = "N/A";

// Extensions kept when saving an upload; anything else is stored as .jpg
pub const UPLOAD_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "webp", "heic", "heif"];
