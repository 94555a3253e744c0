use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod state;

pub use self::state::AppState;
use handlers::{
    api_locations, api_record, api_records, api_settings, gallery, index_html, map_page,
    record_image, script_js, style_css, upload,
};

// Create the main application router
pub async fn create_app(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes();

    Router::new()
        .route("/", get(index_html))
        .route("/style.css", get(style_css))
        .route("/script.js", get(script_js))
        .route("/upload", post(upload))
        .route("/database", get(gallery))
        .route("/map", get(map_page))
        .route("/api/records", get(api_records))
        .route("/api/records/:id", get(api_record))
        .route("/api/records/:id/image", get(record_image))
        .route("/api/locations", get(api_locations))
        .route("/api/settings", get(api_settings))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let app = create_app(state).await;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("HTTP server listening at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::handlers::{RecordJson, RecordPage, UploadResponse};
    use super::*;
    use crate::database::Database;
    use crate::detection::CategorySet;
    use crate::location::CoordinateSource;
    use crate::processing::tests::{png_bytes, FakeDetector};
    use crate::processing::UploadProcessor;
    use crate::settings::Settings;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    const BOUNDARY: &str = "nurdlemap-test-boundary";

    struct TestApp {
        router: Router,
        db: Database,
        _temp: tempfile::TempDir,
    }

    async fn test_app(labels: Vec<&'static str>) -> TestApp {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            upload_dir: temp.path().join("uploads"),
            result_dir: temp.path().join("results"),
            page_size: 2,
            ..Settings::default()
        };
        let db = Database::open_in_memory().unwrap();
        let processor = UploadProcessor::new(
            db.clone(),
            Arc::new(FakeDetector { labels }),
            CategorySet::new(["nurdle", "bead"]),
            settings.upload_dir.clone(),
            settings.result_dir.clone(),
        );
        processor.ensure_directories().unwrap();

        let state = AppState {
            db: db.clone(),
            processor: Arc::new(processor),
            settings: Arc::new(settings),
        };
        TestApp {
            router: create_app(state).await,
            db,
            _temp: temp,
        }
    }

    fn multipart_body(image: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((filename, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_upload(app: &TestApp, body: Vec<u8>) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &TestApp, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn upload_returns_counts_and_client_location() {
        let app = test_app(vec!["nurdle", "bead", "bead"]).await;
        let png = png_bytes();
        let body = multipart_body(
            Some(("beach.png", png.as_slice())),
            &[("latitude", "12.5"), ("longitude", "-45.25")],
        );

        let response = post_upload(&app, body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(upload.record.id, 1);
        assert_eq!(upload.record.total, 3);
        assert_eq!(upload.record.counts["nurdle"], 1);
        assert_eq!(upload.record.counts["bead"], 2);
        assert_eq!(upload.record.latitude, Some(12.5));
        assert_eq!(upload.record.longitude, Some(-45.25));
        assert!(upload.record.location_available);
        assert_eq!(upload.record.location_source, Some(CoordinateSource::Client));
        assert!(!upload.image_data.is_empty());
    }

    #[tokio::test]
    async fn upload_without_location_reports_null() {
        let app = test_app(vec![]).await;
        let png = png_bytes();
        let response = post_upload(&app, multipart_body(Some(("capture.jpg", png.as_slice())), &[])).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(json["latitude"].is_null());
        assert!(json["longitude"].is_null());
        assert_eq!(json["location_available"], false);
        assert_eq!(json["counts"]["nurdle"], 0);
    }

    #[tokio::test]
    async fn upload_rejections() {
        let app = test_app(vec![]).await;

        let response = post_upload(&app, multipart_body(None, &[("latitude", "1")])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, b"No image uploaded");

        let png = png_bytes();
        let response = post_upload(&app, multipart_body(Some(("", png.as_slice())), &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, b"Empty filename");

        let response = post_upload(&app, multipart_body(Some(("empty.jpg", b"".as_slice())), &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn truncated_coordinate_field_is_rejected() {
        let app = test_app(vec![]).await;
        let png = png_bytes();
        let mut body = multipart_body(Some(("beach.png", png.as_slice())), &[]);
        body.truncate(body.len() - format!("--{BOUNDARY}--\r\n").len());
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"latitude\"\r\n\r\n12.5")
                .as_bytes(),
        );

        let response = post_upload(&app, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let message = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(message.starts_with("Failed to read latitude"), "{message}");
        assert_eq!(app.db.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn records_are_paginated_and_images_served() {
        let app = test_app(vec!["nurdle"]).await;
        let png = png_bytes();
        for name in ["a.png", "b.png", "c.png"] {
            let response = post_upload(&app, multipart_body(Some((name, png.as_slice())), &[])).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = get(&app, "/api/records?page=2").await;
        let page: RecordPage = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(page.pagination.total_items, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, 1);

        let response = get(&app, "/api/records/1/image").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(&body_bytes(response).await[..2], &[0xFF, 0xD8]);

        let response = get(&app, "/api/records/3").await;
        let record: RecordJson = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(record.image_url, "/api/records/3/image");

        assert_eq!(get(&app, "/api/records/99").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/api/records/99/image").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn busy_store_does_not_stall_other_requests() {
        let app = test_app(vec![]).await;
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let db = app.db.clone();
        let holder = std::thread::spawn(move || {
            let _guard = db.connection().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(600));
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let request = Request::builder().uri("/database").body(Body::empty()).unwrap();
        let gallery = tokio::spawn(app.router.clone().oneshot(request));
        tokio::task::yield_now().await;

        let response = get(&app, "/map").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() < Duration::from_millis(400));

        let response = gallery.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn gallery_and_map_pages_render() {
        let app = test_app(vec![]).await;
        let png = png_bytes();
        post_upload(
            &app,
            multipart_body(Some(("x.png", png.as_slice())), &[("latitude", "1.5"), ("longitude", "2.5")]),
        )
        .await;
        post_upload(&app, multipart_body(Some(("y.png", png.as_slice())), &[])).await;

        let response = get(&app, "/database?page=7").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("Page 1 of 1"));
        assert!(html.contains("N/A"));
        assert!(html.contains("1.50000, 2.50000"));

        let response = get(&app, "/map").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/api/locations").await;
        let located: Vec<RecordJson> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].latitude, Some(1.5));
    }

    #[tokio::test]
    async fn frontend_assets_are_embedded() {
        let app = test_app(vec![]).await;
        for (uri, content_type) in [
            ("/", "text/html; charset=utf-8"),
            ("/script.js", "application/javascript"),
            ("/style.css", "text/css"),
        ] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(response.headers()[header::CONTENT_TYPE], content_type);
        }

        let response = get(&app, "/api/settings").await;
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["categories"], serde_json::json!(["nurdle", "bead"]));
        assert_eq!(json["page_size"], 2);
    }
}
