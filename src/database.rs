use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::detection::{CategoryCount, DetectionSummary};
use crate::location::{CoordinateSource, GeoCoordinate, ResolvedCoordinate};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS processed_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        image BLOB NOT NULL,
        total_count INTEGER NOT NULL,
        category_counts TEXT NOT NULL,
        latitude REAL,
        longitude REAL,
        location_source TEXT,
        created_at TEXT NOT NULL
    );
";

const SUMMARY_COLUMNS: &str =
    "id, filename, total_count, category_counts, latitude, longitude, location_source, created_at";

/// Everything needed to persist one processed upload.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub filename: String,
    pub image: Vec<u8>,
    pub summary: DetectionSummary,
    pub location: ResolvedCoordinate,
}

/// A stored row without the image blob.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub id: i64,
    pub filename: String,
    pub summary: DetectionSummary,
    pub coordinate: GeoCoordinate,
    pub location_source: Option<CoordinateSource>,
    pub created_at: DateTime<Utc>,
}

// Column values as SQLite hands them back, before JSON/date parsing
struct RawSummary {
    id: i64,
    filename: String,
    total: i64,
    counts_json: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    source: Option<String>,
    created_at: String,
}

impl RawSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            total: row.get(2)?,
            counts_json: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            source: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_summary(self) -> Result<RecordSummary> {
        let counts: Vec<CategoryCount> = serde_json::from_str(&self.counts_json)
            .with_context(|| format!("Corrupt category counts in record {}", self.id))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("Corrupt timestamp in record {}", self.id))?
            .with_timezone(&Utc);
        let total = usize::try_from(self.total)
            .with_context(|| format!("Corrupt total count {} in record {}", self.total, self.id))?;
        let location_source = match self.source {
            Some(s) => Some(s.parse::<CoordinateSource>().map_err(|e| anyhow!(e))?),
            None => None,
        };

        Ok(RecordSummary {
            id: self.id,
            filename: self.filename,
            summary: DetectionSummary {
                total,
                counts,
            },
            coordinate: GeoCoordinate::from_parts(self.latitude, self.longitude),
            location_source,
            created_at,
        })
    }
}

// Connection wrapper shared between request handlers
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create processed_images table")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Inserts a new row; id and timestamp are assigned here.
    pub fn insert(&self, record: &NewRecord) -> Result<RecordSummary> {
        let created_at = Utc::now();
        let counts_json = serde_json::to_string(&record.summary.counts)?;
        let coordinate = record.location.coordinate;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO processed_images
                (filename, image, total_count, category_counts, latitude, longitude, location_source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.filename,
                record.image,
                record.summary.total as i64,
                counts_json,
                coordinate.latitude(),
                coordinate.longitude(),
                record.location.source.map(|s| s.as_str()),
                created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert processed image")?;

        Ok(RecordSummary {
            id: conn.last_insert_rowid(),
            filename: record.filename.clone(),
            summary: record.summary.clone(),
            coordinate,
            location_source: record.location.source,
            created_at,
        })
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM processed_images", [], |row| row.get(0))?;
        usize::try_from(count).with_context(|| format!("Corrupt record count {}", count))
    }

    /// Newest first.
    pub fn page(&self, offset: usize, limit: usize) -> Result<Vec<RecordSummary>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM processed_images ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], RawSummary::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawSummary::into_summary).collect()
    }

    /// Records that carry a coordinate, newest first.
    pub fn located(&self) -> Result<Vec<RecordSummary>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM processed_images
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL
             ORDER BY id DESC"
        ))?;
        let rows = stmt
            .query_map([], RawSummary::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawSummary::into_summary).collect()
    }

    pub fn image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        let conn = self.connection()?;
        let image = conn
            .query_row(
                "SELECT image FROM processed_images WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(image)
    }

    pub fn get(&self, id: i64) -> Result<Option<RecordSummary>> {
        let raw = {
            let conn = self.connection()?;
            conn.query_row(
                &format!("SELECT {SUMMARY_COLUMNS} FROM processed_images WHERE id = ?1"),
                params![id],
                RawSummary::from_row,
            )
            .optional()?
        };
        raw.map(RawSummary::into_summary).transpose()
    }
}
