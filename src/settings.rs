use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::detection::CategorySet;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub result_dir: PathBuf,
    pub detector_command: String,
    pub categories: CategorySet,
    pub max_detections: usize,
    pub page_size: usize,
    pub max_upload_mb: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            result_dir: PathBuf::from(DEFAULT_RESULT_DIR),
            detector_command: DEFAULT_DETECTOR_COMMAND.to_string(),
            categories: CategorySet::new(DEFAULT_CATEGORIES.iter().copied()),
            max_detections: DEFAULT_MAX_DETECTIONS,
            page_size: DEFAULT_PAGE_SIZE,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `key = value` lines; unknown keys are ignored and unparseable
    /// values keep their defaults.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut settings = Settings::default();
        if !config_path.exists() {
            tracing::info!("No config file at {}, using defaults", config_path.display());
            return Ok(settings);
        }

        let file = File::open(config_path).context("Failed to open config file")?;
        let reader = BufReader::new(file);
        let mut config_map = HashMap::new();

        for line in reader.lines() {
            let line = line.context("Failed to read line from config")?;
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }

        if let Some(host) = config_map.get("host").filter(|h| !h.is_empty()) {
            settings.host = host.clone();
        }
        if let Some(port) = parse_value::<u16>(&config_map, "port") {
            settings.port = port;
        }
        if let Some(path) = config_map.get("database_path").filter(|p| !p.is_empty()) {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(dir) = config_map.get("upload_dir").filter(|d| !d.is_empty()) {
            settings.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = config_map.get("result_dir").filter(|d| !d.is_empty()) {
            settings.result_dir = PathBuf::from(dir);
        }
        if let Some(command) = config_map.get("detector_command").filter(|c| !c.is_empty()) {
            settings.detector_command = command.clone();
        }
        if let Some(categories) = config_map.get("categories") {
            let parsed = CategorySet::parse(categories);
            if parsed.is_empty() {
                tracing::warn!("Ignoring empty categories setting");
            } else {
                settings.categories = parsed;
            }
        }
        if let Some(max) = parse_value::<usize>(&config_map, "max_detections").filter(|m| *m > 0) {
            settings.max_detections = max;
        }
        if let Some(size) = parse_value::<usize>(&config_map, "page_size").filter(|s| *s > 0) {
            settings.page_size = size;
        }
        if let Some(mb) = parse_value::<usize>(&config_map, "max_upload_mb").filter(|m| *m > 0) {
            settings.max_upload_mb = mb;
        }

        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Creating config directory")?;
        }

        let mut content = String::new();
        content.push_str("# NurdleMap Configuration File\n");
        content.push_str(&format!("host = {}\n", self.host));
        content.push_str(&format!("port = {}\n", self.port));
        content.push_str(&format!("database_path = \"{}\"\n", self.database_path.display()));
        content.push_str(&format!("upload_dir = \"{}\"\n", self.upload_dir.display()));
        content.push_str(&format!("result_dir = \"{}\"\n", self.result_dir.display()));
        content.push_str(&format!("detector_command = {}\n", self.detector_command));
        content.push_str(&format!("categories = {}\n", self.categories.to_config_string()));
        content.push_str(&format!("max_detections = {}\n", self.max_detections));
        content.push_str(&format!("page_size = {}\n", self.page_size));
        content.push_str(&format!("max_upload_mb = {}\n", self.max_upload_mb));

        std::fs::write(config_path, content).context("Failed to write to config file")?;
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// `NURDLEMAP_CONFIG` wins; otherwise `nurdlemap.ini` next to the binary
    /// (or the project root when running from `target/`).
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("NURDLEMAP_CONFIG") {
            return PathBuf::from(path);
        }

        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push("nurdlemap.ini");
        path
    }
}

fn parse_value<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = map.get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
