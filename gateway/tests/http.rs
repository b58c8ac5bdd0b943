use std::sync::Arc;

use anyhow::Result;
use ingest_gateway::{AppState, build_app, config::AppConfig};
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    state: Arc<AppState>,
    client: Client,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let dir = TempDir::new()?;
        let config = AppConfig {
            working_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let state = Arc::new(AppState::new(Arc::new(config))?);
        let report = state.registry.preload_all().await;
        assert!(report.is_clean(), "{:?}", report.failed);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_app(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base: format!("http://{addr}"),
            state,
            client: Client::new(),
            _dir: dir,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[tokio::test]
async fn extract_plain_text_document() -> Result<()> {
    let server = TestServer::start().await?;

    let response = server
        .client
        .post(server.url("/extract"))
        .header("content-type", "text/plain")
        .header("content-disposition", r#"attachment; filename="notes.txt""#)
        .body("first line\nsecond line")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let frame: Value = response.json().await?;
    assert_eq!(frame["format"], "text");
    assert_eq!(frame["filename"], "notes.txt");
    assert_eq!(frame["text"], "first line\nsecond line");
    Ok(())
}

#[tokio::test]
async fn dispatch_errors_map_to_statuses() -> Result<()> {
    let server = TestServer::start().await?;

    let unsupported = server
        .client
        .post(server.url("/extract"))
        .header("content-type", "application/x-unknown")
        .body("?")
        .send()
        .await?;
    assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let missing = server.client.get(server.url("/nosuch/path")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(missing.text().await?.contains("nosuch"));

    let wrong_method = server.client.get(server.url("/extract")).send().await?;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);

    let ping: Value = server
        .client
        .get(server.url("/ping"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(ping, json!({ "service": "ping", "status": "ok" }));
    Ok(())
}

#[tokio::test]
async fn records_are_built_on_first_request() -> Result<()> {
    let server = TestServer::start().await?;
    assert!(!server.state.registry.descriptor("records").unwrap().is_initialized());

    let statuses: Value = server
        .client
        .get(server.url("/services"))
        .send()
        .await?
        .json()
        .await?;
    let names: Vec<&str> = statuses
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ping", "extract", "records"]);
    assert_eq!(statuses[2]["initialized"], false);

    let stored: Value = server
        .client
        .put(server.url("/records/case-1"))
        .json(&json!({ "title": "Quarterly report" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(stored["_id"], "case-1");
    assert_eq!(stored["title"], "Quarterly report");
    assert!(server.state.registry.descriptor("records").unwrap().is_initialized());

    let listed: Value = server
        .client
        .get(server.url("/records"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed["ids"], json!(["case-1"]));

    let deleted = server
        .client
        .delete(server.url("/records/case-1"))
        .send()
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = server
        .client
        .get(server.url("/records/case-1"))
        .send()
        .await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let invalid = server
        .client
        .put(server.url("/records/case-2"))
        .body("not json")
        .send()
        .await?;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn uploaded_image_is_served_as_figure() -> Result<()> {
    let server = TestServer::start().await?;
    let png = b"\x89PNG\r\n\x1a\nfake".to_vec();

    let form = Form::new().part(
        "file",
        Part::bytes(png.clone())
            .file_name("scan.png")
            .mime_str("image/png")?,
    );
    let frame: Value = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(frame["format"], "image");
    let url = frame["figures"][0]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/extract/figure/"));

    let figure = server.client.get(server.url(&url)).send().await?;
    assert_eq!(figure.status(), StatusCode::OK);
    assert_eq!(figure.headers()["content-type"], "image/png");
    assert!(figure.headers().contains_key("etag"));
    assert!(figure.headers().contains_key("last-modified"));
    assert_eq!(
        figure.headers()["cache-control"],
        "public, max-age=31536000, immutable"
    );
    assert_eq!(figure.bytes().await?.to_vec(), png);
    Ok(())
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() -> Result<()> {
    let server = TestServer::start().await?;

    let form = Form::new().text("comment", "no document here");
    let response = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn figures_with_reserved_characters_are_reachable() -> Result<()> {
    let server = TestServer::start().await?;

    for name in ["plain.png", "a%20b.png", "fig#1.png", "q?x.png"] {
        let url = server
            .state
            .extraction
            .add_figure(name, name.as_bytes().to_vec().into());
        let response = server.client.get(server.url(&url)).send().await?;
        assert_eq!(response.status(), StatusCode::OK, "{name} at {url}");
        assert_eq!(response.bytes().await?.as_ref(), name.as_bytes());
    }
    Ok(())
}
