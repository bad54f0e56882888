//! Router tests for the prediction flow
//!
//! Run the full HTTP stack against fake models, a temp media root and an
//! in-memory database.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::memory_pool;
use crate::inference::loader::testing::FakeLoader;
use crate::inference::{ModelRegistry, ThresholdConfig};
use crate::models::{PredictionFilter, PredictionRecord};
use crate::{create_router, AppState};

const BOUNDARY: &str = "XRAYTESTBOUNDARY";

struct Harness {
    state: AppState,
    _dir: TempDir,
}

impl Harness {
    fn media_root(&self) -> &Path {
        &self.state.config.media_root
    }

    fn review_dir(&self) -> PathBuf {
        self.state.config.review_dir()
    }

    async fn send(&self, req: Request<Body>) -> Response {
        create_router(self.state.clone()).oneshot(req).await.unwrap()
    }

    async fn records(&self) -> Vec<PredictionRecord> {
        PredictionRecord::list_recent(&self.state.pool, &PredictionFilter::default())
            .await
            .unwrap()
    }
}

fn config(dir: &Path) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        media_root: dir.join("media"),
        media_url: "/media/".to_string(),
        feature_model_path: dir.join("cnn_feature.onnx"),
        classifier_model_path: dir.join("booster.onnx"),
        max_upload_bytes: 10 * 1024 * 1024,
        environment: "test".to_string(),
    }
}

async fn harness_with_pool(loader: FakeLoader, pool: sqlx::SqlitePool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    std::fs::create_dir_all(&config.media_root).unwrap();

    let registry = Arc::new(ModelRegistry::new(loader));
    registry.ensure_loaded();

    Harness {
        state: AppState::new(config, pool, registry, ThresholdConfig::default()),
        _dir: dir,
    }
}

async fn harness(loader: FakeLoader) -> Harness {
    harness_with_pool(loader, memory_pool().await).await
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 100]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY,
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn post_image(uri: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    post(uri, multipart_body("image", file_name, bytes))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_valid_jpeg_json_prediction() {
    let h = harness(FakeLoader::probabilistic(0.82)).await;

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(512, 512))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["prediction"], "PNEUMONIA");
    let p = body["probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert!((p - 0.82).abs() < 1e-6);

    let url = body["image_url"].as_str().unwrap();
    assert!(url.starts_with("/media/uploads/"));
    assert!(url.ends_with(".jpg"));

    let records = h.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "PNEUMONIA");
    assert_eq!(format!("/media/{}", records[0].image), url);

    // Confident: nothing archived
    assert_eq!(files_in(&h.review_dir()), 0);
}

#[tokio::test]
async fn test_uploaded_image_is_served() {
    let h = harness(FakeLoader::probabilistic(0.82)).await;
    let bytes = jpeg_bytes(64, 64);

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &bytes)).await;
    let body = body_json(resp).await;
    let url = body["image_url"].as_str().unwrap().to_string();

    let resp = h.send(get(&url)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let served = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.to_vec(), bytes);
}

#[tokio::test]
async fn test_accept_header_selects_json() {
    let h = harness(FakeLoader::probabilistic(0.2)).await;

    let mut req = post_image("/predict/", "scan.png", &jpeg_bytes(100, 80));
    req.headers_mut()
        .insert(header::ACCEPT, "application/json".parse().unwrap());
    let resp = h.send(req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["prediction"], "NORMAL");
}

#[tokio::test]
async fn test_html_result_page() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(post_image("/predict/", "scan.jpeg", &jpeg_bytes(300, 300))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = body_text(resp).await;
    assert!(html.contains("PNEUMONIA"));
    assert!(html.contains("90.00%"));
    assert!(html.contains("/media/uploads/"));
}

#[tokio::test]
async fn test_missing_image_field() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let req = post("/predict/?json=1", multipart_body("file", "a.jpg", &jpeg_bytes(10, 10)));
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await, json!({ "error": "Missing file field \"image\"" }));

    // HTML mode
    let req = post("/predict/", multipart_body("file", "a.jpg", &jpeg_bytes(10, 10)));
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("Missing file field"));

    assert!(h.records().await.is_empty());
}

#[tokio::test]
async fn test_non_multipart_post_is_missing_field() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let req = Request::builder()
        .method("POST")
        .uri("/predict/?json=1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Missing file field \"image\"");
}

#[tokio::test]
async fn test_empty_file_input_is_missing_field() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(post_image("/predict/?json=1", "", b"")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Missing file field \"image\"");
}

#[tokio::test]
async fn test_named_empty_file_is_invalid_image() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(post_image("/predict/?json=1", "empty.jpg", b"")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Invalid image file");
    assert!(h.records().await.is_empty());
}

#[tokio::test]
async fn test_json_flag_is_exact_and_last_value_wins() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    // Repeated flag: last value decides
    let resp = h.send(post_image("/predict/?json=0&json=1", "a.jpg", &jpeg_bytes(32, 32))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["prediction"], "PNEUMONIA");

    let resp = h.send(post_image("/predict/?json=1&json=no", "a.jpg", &jpeg_bytes(32, 32))).await;
    assert!(body_text(resp).await.contains("<!DOCTYPE html>"));

    // Only lowercase 1|true|yes switch to JSON
    let resp = h.send(post_image("/predict/?json=TRUE", "a.jpg", &jpeg_bytes(32, 32))).await;
    assert!(body_text(resp).await.contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn test_get_predict_renders_upload_page() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(get("/predict/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains(r#"name="image""#));

    // Nothing saved, nothing recorded
    assert!(h.records().await.is_empty());
    assert_eq!(files_in(&h.media_root().join("uploads")), 0);
}

#[tokio::test]
async fn test_get_predict_json_is_method_not_allowed() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(get("/predict/?json=true")).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_json(resp).await, json!({ "error": "POST required" }));
}

#[tokio::test]
async fn test_home_page() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(get("/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("enctype=\"multipart/form-data\""));
}

#[tokio::test]
async fn test_corrupted_image() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;

    let resp = h.send(post_image("/predict/?json=1", "broken.jpg", b"\xff\xd8\xffgarbage")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Invalid image file");
    assert!(body["details"].is_string());

    let resp = h.send(post_image("/predict/", "broken.jpg", b"not an image")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("Invalid image file"));

    assert!(h.records().await.is_empty());
}

#[tokio::test]
async fn test_models_unavailable() {
    let h = harness(FakeLoader::failing()).await;

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(512, 512))).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Model unavailable");
    assert!(body["details"].as_str().unwrap().contains("unavailable"));
    assert!(h.records().await.is_empty());
}

#[tokio::test]
async fn test_decode_checked_before_models() {
    // A bad upload is still a 400 when the models are down
    let h = harness(FakeLoader::failing()).await;

    let resp = h.send(post_image("/predict/?json=1", "broken.png", b"junk")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_database_failure_does_not_change_response() {
    let bytes = jpeg_bytes(256, 256);

    let healthy = harness(FakeLoader::probabilistic(0.7)).await;
    let ok_resp = healthy.send(post_image("/predict/?json=1", "a.jpg", &bytes)).await;
    let ok_status = ok_resp.status();
    let ok_body = body_json(ok_resp).await;

    // No schema: every insert fails
    let broken_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let broken = harness_with_pool(FakeLoader::probabilistic(0.7), broken_pool).await;
    let resp = broken.send(post_image("/predict/?json=1", "a.jpg", &bytes)).await;

    assert_eq!(resp.status(), ok_status);
    let body = body_json(resp).await;
    assert_eq!(body["prediction"], ok_body["prediction"]);
    assert_eq!(body["probability"], ok_body["probability"]);
    assert!(body["image_url"].as_str().unwrap().starts_with("/media/uploads/"));
}

#[tokio::test]
async fn test_uncertain_prediction_archived() {
    let h = harness(FakeLoader::probabilistic(0.3)).await;

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(512, 512))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let archived: Vec<_> = std::fs::read_dir(h.review_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(archived.len(), 1);
    let name = archived[0].file_name().unwrap().to_str().unwrap();
    assert!(name.ends_with("_uncertain.jpg"));

    let copy = image::open(&archived[0]).unwrap();
    assert_eq!((copy.width(), copy.height()), (224, 224));
}

#[tokio::test]
async fn test_discrete_normal_is_always_archived() {
    let h = harness(FakeLoader::discrete(0)).await;

    let resp = h.send(post_image("/predict/?json=1", "chest.png", &jpeg_bytes(128, 128))).await;
    let body = body_json(resp).await;
    assert_eq!(body["prediction"], "NORMAL");
    assert_eq!(body["probability"], 0.0);
    assert_eq!(files_in(&h.review_dir()), 1);
}

#[tokio::test]
async fn test_archive_failure_does_not_change_response() {
    let h = harness(FakeLoader::probabilistic(0.3)).await;
    std::fs::write(h.review_dir(), b"file in the way").unwrap();

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(512, 512))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["prediction"], "NORMAL");
    assert_eq!(h.records().await.len(), 1);
}

#[tokio::test]
async fn test_storage_failure() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;
    std::fs::write(h.media_root().join("uploads"), b"file in the way").unwrap();

    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(64, 64))).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["error"], "Failed to save upload");
}

#[tokio::test]
async fn test_history_endpoints() {
    let h = harness(FakeLoader::probabilistic(0.9)).await;
    for _ in 0..2 {
        let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(64, 64))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let list = body_json(h.send(get("/api/v1/predictions?limit=10")).await).await;
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["label"], "PNEUMONIA");
    assert!(items[0]["image_url"].as_str().unwrap().starts_with("/media/uploads/"));

    let id = items[0]["id"].as_i64().unwrap();
    let one = h.send(get(&format!("/api/v1/predictions/{}", id))).await;
    assert_eq!(one.status(), StatusCode::OK);

    let missing = h.send(get("/api/v1/predictions/9999")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let stats = body_json(h.send(get("/api/v1/predictions/stats")).await).await;
    assert_eq!(stats["total"], 2);
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let ready = harness(FakeLoader::probabilistic(0.9)).await;
    let body = body_json(ready.send(get("/health")).await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models"]["feature_extractor"]["state"], "ready");
    assert_eq!(body["models"]["classifier_kind"], "probabilistic");

    let down = harness(FakeLoader::failing()).await;
    let body = body_json(down.send(get("/health")).await).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["models"]["classifier"]["state"], "failed");
}

#[tokio::test]
async fn test_reload_models() {
    let loader = FakeLoader::probabilistic(0.9);
    let h = harness(loader.clone()).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/models/reload")
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["reloaded"], true);
    assert_eq!(body["errors"], json!([]));
    assert_eq!(body["models"]["feature_extractor"]["state"], "ready");
    assert_eq!(body["models"]["embedding_tap"], "global_average_pooling2d");
    assert_eq!(loader.load_count(), 2);
}

#[tokio::test]
async fn test_failed_reload_keeps_serving() {
    let loader = FakeLoader::probabilistic(0.9);
    let h = harness(loader.clone()).await;
    loader.set_extractor_failing(true);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/models/reload")
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(resp).await;
    assert_eq!(body["reloaded"], false);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["models"]["feature_extractor"]["state"], "ready");

    // Predictions still work with the previous extractor
    let resp = h.send(post_image("/predict/?json=1", "chest.jpg", &jpeg_bytes(64, 64))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(h.send(get("/health")).await).await;
    assert_eq!(body["status"], "healthy");
}
