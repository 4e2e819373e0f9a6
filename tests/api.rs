use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use takedown_observer::config::CorsConfig;
use takedown_observer::server::build_router;
use takedown_observer::store::AccountStore;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

const CLIENT_A: &str = "123e4567-e89b-12d3-a456-426614174000";
const CLIENT_B: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";
const INDEX_HTML: &str = "<!doctype html><title>dashboard</title>";

struct TestApp {
    router: Router,
    store: Arc<AccountStore>,
    _static_dir: TempDir,
}

fn app() -> TestApp {
    app_with_store(AccountStore::open_in_memory().expect("store opened"))
}

fn app_with_store(store: AccountStore) -> TestApp {
    let static_dir = tempdir().expect("temporary directory");
    fs::write(static_dir.path().join("index.html"), INDEX_HTML).expect("index written");
    fs::create_dir(static_dir.path().join("js")).expect("js dir created");
    fs::write(static_dir.path().join("js").join("app.js"), "// app").expect("script written");

    let store = Arc::new(store);
    let router = build_router(Arc::clone(&store), static_dir.path(), &CorsConfig::default());
    TestApp {
        router,
        store,
        _static_dir: static_dir,
    }
}

fn report_body(client_id: &str, id: &str, countries: &[&str]) -> Value {
    json!({
        "client_id": client_id,
        "data_format_version": "1.0",
        "account": { "id": id, "name": "Acct", "countries": countries }
    })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    (status, body.to_vec())
}

async fn post_report(router: &Router, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/report")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("request built");
    send(router, request).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request built");
    send(router, request).await
}

#[tokio::test]
async fn report_is_accepted_and_counted() {
    let app = app();

    let (status, body) =
        post_report(&app.router, report_body(CLIENT_A, "acct_1", &["US", "GB"]).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body, json!({ "status": "success", "outcome": "created" }));

    let (status, _) =
        post_report(&app.router, report_body(CLIENT_A, "acct_1", &["US"]).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        post_report(&app.router, report_body(CLIENT_B, "acct_1", &["US"]).to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let account = app.store.get("acct_1").expect("read").expect("stored");
    assert_eq!(account.report_count, 2);
    assert_eq!(account.countries, vec!["US"]);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = app();
    let (status, body) = post_report(&app.router, "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"Invalid request body");
}

#[tokio::test]
async fn validation_failures_are_client_errors() {
    let app = app();

    let (status, body) =
        post_report(&app.router, report_body("nope", "acct_1", &["US"]).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8_lossy(&body), "invalid client ID format");

    let mut wrong_version = report_body(CLIENT_A, "acct_1", &["US"]);
    wrong_version["data_format_version"] = json!("2.0");
    let (status, body) = post_report(&app.router, wrong_version.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8_lossy(&body), "unsupported data format version");

    let (status, body) =
        post_report(&app.router, report_body(CLIENT_A, "acct_1", &["us"]).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).starts_with("invalid countries"));

    assert!(app.store.get("acct_1").expect("read").is_none());
}

#[tokio::test]
async fn accounts_endpoint_returns_page() {
    let app = app();
    post_report(&app.router, report_body(CLIENT_A, "acct_1", &["US", "GB"]).to_string()).await;
    post_report(&app.router, report_body(CLIENT_A, "acct_2", &["FR"]).to_string()).await;

    let (status, body) = get(&app.router, "/api/accounts?country=FR&page=0").await;
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_slice(&body).expect("json body");

    assert_eq!(page["totalCount"], 1);
    assert_eq!(page["currentPage"], 1);
    assert_eq!(page["totalPages"], 1);
    assert_eq!(page["uniqueCountries"], json!(["FR", "GB", "US"]));
    assert_eq!(page["accounts"][0]["id"], "acct_2");
    assert!(page["accounts"][0].get("reported_by").is_none());
}

#[tokio::test]
async fn download_returns_csv_attachment() {
    let app = app();
    post_report(&app.router, report_body(CLIENT_A, "acct_1", &["US", "GB"]).to_string()).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/download")
                .body(Body::empty())
                .expect("request built"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=takedowns.csv"
    );

    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    let text = String::from_utf8(body.to_vec()).expect("utf-8");
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Account ID,Username,Countries,Last Reported At,Data Format Version")
    );
    assert!(lines.next().expect("data row").starts_with("acct_1,Acct,\"US, GB\","));
}

#[tokio::test]
async fn spa_routes_serve_index() {
    let app = app();
    for route in ["/", "/dashboard", "/about", "/related-work"] {
        let (status, body) = get(&app.router, route).await;
        assert_eq!(status, StatusCode::OK, "{route}");
        assert_eq!(String::from_utf8_lossy(&body), INDEX_HTML, "{route}");
    }

    let (status, body) = get(&app.router, "/static/js/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"// app");
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let app = app();
    for route in ["/missing", "/api/unknown", "/dashboard/extra"] {
        let (status, _) = get(&app.router, route).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{route}");
    }

    let (status, _) = get(&app.router, "/api/report").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn cors_allows_configured_origins_only() {
    let app = app();
    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/report")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .expect("request built")
    };

    let response = app
        .router
        .clone()
        .oneshot(preflight("https://x.com"))
        .await
        .expect("response");
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://x.com"
    );

    let response = app
        .router
        .clone()
        .oneshot(preflight("https://evil.example"))
        .await
        .expect("response");
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

fn corrupt_database(db_path: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(db_path).expect("side connection opened");
    conn.execute_batch(sql).expect("database altered");
}

#[tokio::test]
async fn storage_failures_return_database_error() {
    let data_dir = tempdir().expect("temporary directory");
    let db_path = data_dir.path().join("takedowns.db");
    let app = app_with_store(AccountStore::open(&db_path).expect("store opened"));

    let (status, _) =
        post_report(&app.router, report_body(CLIENT_A, "acct_1", &["US"]).to_string()).await;
    assert_eq!(status, StatusCode::OK);

    corrupt_database(&db_path, "UPDATE accounts SET countries = 'not json';");

    let (status, body) = get(&app.router, "/api/accounts").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, b"Database error");

    let request = Request::builder()
        .uri("/api/download")
        .body(Body::empty())
        .expect("request built");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(!content_type.starts_with("text/csv"), "got {content_type}");
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    assert_eq!(&body[..], b"Database error");

    corrupt_database(&db_path, "DROP TABLE accounts;");

    let (status, body) =
        post_report(&app.router, report_body(CLIENT_B, "acct_2", &["GB"]).to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, b"Database error");
}
