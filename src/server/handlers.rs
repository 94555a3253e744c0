use axum::{
    extract::{Multipart, Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::{Database, RecordSummary};
use crate::html_template::{gallery_html, map_html};
use crate::location::{ClientCoordinate, CoordinateSource};
use crate::pagination::Pagination;

use super::state::AppState;

#[derive(RustEmbed)]
#[folder = "frontend/"]
struct Asset;

/// A stored record as the browser sees it. Absent coordinates are `null`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordJson {
    pub id: i64,
    pub filename: String,
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_available: bool,
    pub location_source: Option<CoordinateSource>,
    pub created_at: DateTime<Utc>,
    pub image_url: String,
}

impl From<&RecordSummary> for RecordJson {
    fn from(record: &RecordSummary) -> Self {
        RecordJson {
            id: record.id,
            filename: record.filename.clone(),
            total: record.summary.total,
            counts: record
                .summary
                .counts
                .iter()
                .map(|c| (c.category.clone(), c.count))
                .collect(),
            latitude: record.coordinate.latitude(),
            longitude: record.coordinate.longitude(),
            location_available: record.coordinate.is_known(),
            location_source: record.location_source,
            created_at: record.created_at,
            image_url: format!("/api/records/{}/image", record.id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub record: RecordJson,
    pub image_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<RecordJson>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("{}: {:#}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Runs a store call on the blocking pool so the connection lock is never
/// awaited on a runtime worker.
async fn with_db<T, F>(state: &AppState, context: &'static str, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| internal_error(context, e))?
        .map_err(|e| internal_error(context, e))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

fn embedded(path: &str, content_type: &'static str) -> Response {
    match Asset::get(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type)],
            file.data.into_owned(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn index_html() -> Response {
    embedded("index.html", "text/html; charset=utf-8")
}

pub async fn style_css() -> Response {
    embedded("style.css", "text/css")
}

pub async fn script_js() -> Response {
    embedded("script.js", "application/javascript")
}

/// Multipart upload: an `image` file part plus optional `latitude` and
/// `longitude` text parts from the browser's geolocation.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut client = ClientCoordinate::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read image: {}", e)))?;
                image = Some((filename, bytes.to_vec()));
            }
            Some("latitude") => {
                client.latitude = Some(field.text().await.map_err(|e| {
                    bad_request(format!("Failed to read latitude: {}", e))
                })?);
            }
            Some("longitude") => {
                client.longitude = Some(field.text().await.map_err(|e| {
                    bad_request(format!("Failed to read longitude: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let (filename, bytes) = image.ok_or_else(|| bad_request("No image uploaded"))?;
    if filename.trim().is_empty() {
        return Err(bad_request("Empty filename"));
    }
    if bytes.is_empty() {
        return Err(bad_request("Empty image"));
    }

    tracing::debug!(file = %filename, size = bytes.len(), "Received upload");

    let processor = state.processor.clone();
    let upload = tokio::task::spawn_blocking(move || processor.process(&filename, &bytes, &client))
        .await
        .map_err(|e| {
            (
                internal_error("Upload task failed", e),
                "Failed to process the image".to_string(),
            )
        })?
        .map_err(|e| {
            (
                internal_error("Upload processing failed", e),
                "Failed to process the image".to_string(),
            )
        })?;

    Ok(Json(UploadResponse {
        record: RecordJson::from(&upload.record),
        image_data: STANDARD.encode(&upload.annotated_jpeg),
    }))
}

async fn load_page(
    state: &AppState,
    requested: usize,
) -> Result<(Vec<RecordSummary>, Pagination), StatusCode> {
    let per_page = state.settings.page_size;
    with_db(state, "Failed to load records", move |db| {
        let pagination = Pagination::new(requested, per_page, db.count()?);
        let records = db.page(pagination.offset(), pagination.per_page)?;
        Ok((records, pagination))
    })
    .await
}

pub async fn gallery(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, StatusCode> {
    let (records, pagination) = load_page(&state, query.page.unwrap_or(1)).await?;
    Ok(gallery_html(&records, &pagination, &state.settings.categories))
}

pub async fn map_page() -> Html<String> {
    map_html()
}

pub async fn api_records(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<RecordPage>, StatusCode> {
    let (records, pagination) = load_page(&state, query.page.unwrap_or(1)).await?;
    Ok(Json(RecordPage {
        records: records.iter().map(RecordJson::from).collect(),
        pagination,
    }))
}

pub async fn api_record(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<RecordJson>, StatusCode> {
    let record = with_db(&state, "Failed to load record", move |db| db.get(id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(RecordJson::from(&record)))
}

pub async fn record_image(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Response, StatusCode> {
    let jpeg = with_db(&state, "Failed to load image", move |db| db.image(id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        jpeg,
    )
        .into_response())
}

/// Located records for the map, skipping any stored point outside the valid
/// ranges.
pub async fn api_locations(State(state): State<AppState>) -> Result<Json<Vec<RecordJson>>, StatusCode> {
    let located = with_db(&state, "Failed to load locations", |db| db.located()).await?;

    Ok(Json(
        located
            .iter()
            .filter(|r| r.coordinate.point().is_some_and(|p| p.in_range()))
            .map(RecordJson::from)
            .collect(),
    ))
}

pub async fn api_settings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = &state.settings;
    Json(serde_json::json!({
        "categories": settings.categories,
        "page_size": settings.page_size,
        "max_detections": settings.max_detections,
        "max_upload_mb": settings.max_upload_mb,
    }))
}
