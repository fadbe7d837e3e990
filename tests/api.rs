mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{broken_replica_pair, embedded_backend, local_store, service, state};
use record_store::routes;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "record-store-test-boundary";
const BODY_LIMIT: usize = 1024 * 1024;

async fn app(dir: &TempDir) -> Router {
    let records = service(embedded_backend(dir).await, local_store(dir).await);
    routes(state(records), BODY_LIMIT)
}

fn multipart(name: Option<&str>, image: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(name) = name {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn upload(app: &Router, name: &str, filename: &str, bytes: &[u8]) -> Value {
    let response = send(app, multipart(Some(name), Some((filename, bytes)))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json(response).await
}

#[tokio::test]
async fn upload_returns_created_record_with_write_descriptor() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let response = send(&app, multipart(Some("cat"), Some(("cat 1.png", &b"\x89PNG"[..])))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-server-number"], "1");
    let write_db = response.headers()["x-write-db"].to_str().unwrap().to_owned();
    assert!(write_db.starts_with("write:sqlite:"));

    let body = json(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["name"], "cat");
    assert_eq!(body["serverNumber"], "1");
    assert_eq!(body["writeDb"], write_db.as_str());
    let url = body["imageUrl"].as_str().unwrap();
    assert!(url.starts_with("/uploads/") && url.ends_with("-cat1.png"));
    assert!(body.get("dbSource").is_none());
}

#[tokio::test]
async fn upload_validation_errors_are_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let response = send(&app, multipart(None, Some(("a.png", &b"x"[..])))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "name is required");

    let response = send(&app, multipart(Some("a"), None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "image file is required");

    let body = json(send(&app, get("/api/images")).await).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn latest_and_listing_report_read_source() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let body = json(send(&app, get("/api/latest")).await).await;
    assert!(body["item"].is_null());

    upload(&app, "A", "a.png", b"a").await;
    upload(&app, "B", "b.png", b"b").await;

    let response = send(&app, get("/api/latest")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["x-db-source"]
            .to_str()
            .unwrap()
            .starts_with("read:")
    );
    assert!(
        response.headers()["x-write-db"]
            .to_str()
            .unwrap()
            .starts_with("write:sqlite:")
    );
    let body = json(response).await;
    assert_eq!(body["item"]["name"], "B");
    assert!(body["dbSource"].as_str().unwrap().starts_with("read:"));
    assert!(body["writeDb"].as_str().unwrap().starts_with("write:sqlite:"));

    let body = json(send(&app, get("/api/latest-5")).await).await;
    let names: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["B", "A"]);
}

#[tokio::test]
async fn listing_paginates() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;
    for i in 0..5 {
        upload(&app, &format!("n{i}"), &format!("f{i}.png"), b"x").await;
    }

    let body = json(send(&app, get("/api/images?page=2&limit=2")).await).await;
    assert_eq!(body["total"], 5);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["totalPages"], 3);
    let names: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["n2", "n1"]);

    let body = json(send(&app, get("/api/images?page=abc&limit=999")).await).await;
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 50);
    assert_eq!(body["items"].as_array().unwrap().len(), 5);

    let body = json(send(&app, get("/api/images?page=9")).await).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["limit"], 10);
}

#[tokio::test]
async fn delete_removes_record_and_blob() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;
    let created = upload(&app, "A", "a.png", b"payload").await;
    let url = created["imageUrl"].as_str().unwrap().to_owned();

    let response = send(&app, get(&url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"payload");

    let response = send(&app, delete("/api/images/1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-write-db"));
    let body = json(response).await;
    assert_eq!(body["deleted"], true);
    assert_eq!(body["id"], 1);
    assert!(body["dbSource"].as_str().unwrap().starts_with("write:sqlite:"));
    assert!(body["writeDb"].as_str().unwrap().starts_with("write:sqlite:"));

    let response = send(&app, delete("/api/images/1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, get(&url)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json(response).await["error"].is_string());
}

#[tokio::test]
async fn non_numeric_id_is_a_json_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let response = send(&app, delete("/api/images/abc")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = json(response).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "invalid record id `abc`");
}

#[tokio::test]
async fn delete_reports_lookup_and_write_endpoints() {
    let dir = TempDir::new().unwrap();
    let pair = common::shared_pair(&dir).await;
    let records = service(pair.backend.clone(), local_store(&dir).await);
    let app = routes(state(records), BODY_LIMIT);
    upload(&app, "A", "a.png", b"x").await;

    let response = send(&app, delete("/api/images/1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-db-source"], "write:primary.test:3306");
    assert_eq!(response.headers()["x-write-db"], "write:primary.test:3306");

    let response = send(&app, get("/api/images")).await;
    assert_eq!(response.headers()["x-db-source"], "read:replica.test:3307");
    assert_eq!(response.headers()["x-write-db"], "write:primary.test:3306");
}

#[tokio::test]
async fn unknown_upload_key_is_404() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;
    let response = send(&app, get("/uploads/1-missing.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-server-number"], "1");
}

#[tokio::test]
async fn probes_and_info() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");

    let response = send(&app, get("/readyz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["primary"]["ok"], true);
    assert_eq!(body["checks"]["objects"]["ok"], true);

    let body = json(send(&app, get("/api/info")).await).await;
    assert_eq!(body["port"], 8000);
    assert_eq!(body["serverNumber"], "1");
    assert!(body["ip"].is_string());
}

#[tokio::test]
async fn replica_failure_is_visible_in_descriptor_and_readiness() {
    let dir = TempDir::new().unwrap();
    let pair = broken_replica_pair(&dir).await;
    let records = service(pair.backend.clone(), local_store(&dir).await);
    let app = routes(state(records), BODY_LIMIT);

    let created = upload(&app, "A", "a.png", b"x").await;
    assert_eq!(created["writeDb"], "write:primary.test:3306");

    let response = send(&app, get("/api/latest")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-db-source"], "read:primary.test:3306");
    assert_eq!(response.headers()["x-write-db"], "write:primary.test:3306");
    assert_eq!(json(response).await["item"]["name"], "A");

    pair.replica.pool().close().await;
    let response = send(&app, get("/readyz")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json(response).await;
    assert_eq!(body["checks"]["primary"]["ok"], true);
    assert_eq!(body["checks"]["replica"]["ok"], false);

    pair.primary.pool().close().await;
    let response = send(&app, get("/api/latest")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(response).await;
    assert_eq!(body["error"], "internal error");

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
