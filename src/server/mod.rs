//! HTTP API for contract analysis.
//!
//! Upload a contract, split or analyze it, and read back the stored
//! risk-tier reports.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::classify::ClassificationSource;
use crate::config::{Config, Settings};
use crate::services::{AnalysisService, ResultsService};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub analysis: Arc<AnalysisService>,
    pub results: ResultsService,
    pub classifier: Arc<dyn ClassificationSource>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(settings: &Settings, config: &Config) -> anyhow::Result<Self> {
        let analysis = AnalysisService::from_config(settings, config)?;
        Ok(Self::from_service(analysis, config.server.max_upload_bytes))
    }

    /// Wrap an already-built analysis service.
    pub fn from_service(analysis: AnalysisService, max_upload_bytes: usize) -> Self {
        let results =
            ResultsService::from_parts(analysis.store().clone(), analysis.runs().clone());
        Self {
            settings: Arc::new(analysis.settings().clone()),
            classifier: analysis.classifier().clone(),
            analysis: Arc::new(analysis),
            results,
            max_upload_bytes,
        }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, config: &Config, host: &str, port: u16) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let state = AppState::new(settings, config)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::classify::Classification;
    use crate::config::AnalysisConfig;
    use crate::llm::{Categorizer, LlmError};
    use crate::models::{ClauseKey, RiskTier};

    struct NoCategorizer;

    #[async_trait]
    impl Categorizer for NoCategorizer {
        async fn categorize(&self, _text: &str, _keys: &[ClauseKey]) -> Result<String, LlmError> {
            Err(LlmError::Disabled)
        }
    }

    fn setup_test_app_with(max_upload_bytes: usize) -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        let classification = Classification::from_tiers([
            ("termination", RiskTier::High),
            ("renewal", RiskTier::Low),
        ]);
        let analysis = AnalysisService::from_parts(
            &settings,
            AnalysisConfig::default(),
            Arc::new(NoCategorizer),
            Arc::new(classification),
        )
        .unwrap();
        let app = create_router(AppState::from_service(analysis, max_upload_bytes));
        (app, dir)
    }

    fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        setup_test_app_with(crate::config::DEFAULT_MAX_UPLOAD_BYTES)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart(file_name: &str, content: &[u8]) -> Request<Body> {
        let boundary = "clauseguard-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/pdf\r\n\r\n",
                b = boundary,
                f = file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    const FAKE_PDF: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app();
        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_classification() {
        let (app, _dir) = setup_test_app();
        let response = app.oneshot(get("/api/classification")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["all_items"], serde_json::json!(["termination", "renewal"]));
        assert_eq!(json["high_toxicity_items"], serde_json::json!(["termination"]));
        assert_eq!(json["low_toxicity_items"], serde_json::json!(["renewal"]));
    }

    #[tokio::test]
    async fn test_latest_without_results_is_404() {
        let (app, _dir) = setup_test_app();
        let response = app.oneshot(get("/api/results/latest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["error"], "ArtifactNotFound");
        assert!(json["details"].is_string());
    }

    #[tokio::test]
    async fn test_write_then_read_results() {
        let (app, _dir) = setup_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/results",
                serde_json::json!({
                    "data": [
                        "{\"high\": [\"Either party may terminate\"], \"medium\": [], \"low\": [\"\"]}",
                        {"high": [], "medium": ["Liability capped"], "low": ["Renews yearly"]}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 1);

        let response = app.clone().oneshot(get("/api/results/latest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["version"], 1);
        assert_eq!(json["report"]["high"], serde_json::json!(["Either party may terminate"]));
        assert_eq!(json["report"]["medium"], serde_json::json!(["Liability capped"]));
        assert_eq!(json["report"]["low"], serde_json::json!(["Renews yearly"]));

        let response = app.clone().oneshot(get("/api/results/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/results/7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_write_results_rejects_bad_data() {
        let (app, _dir) = setup_test_app();

        let response = app
            .clone()
            .oneshot(post_json("/api/results", serde_json::json!({"data": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/api/results",
                serde_json::json!({"data": ["{not json"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "InvalidData");
    }

    #[tokio::test]
    async fn test_export_markdown() {
        let (app, _dir) = setup_test_app();
        app.clone()
            .oneshot(post_json(
                "/api/results",
                serde_json::json!({"data": [{"high": ["Termination at will"]}]}),
            ))
            .await
            .unwrap();

        let response = app.oneshot(get("/api/results/latest/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap_or("").to_string())
            .unwrap_or_default();
        assert!(content_type.contains("markdown"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("## High Risk"));
        assert!(text.contains("- Termination at will"));
    }

    #[tokio::test]
    async fn test_upload_pdf() {
        let (app, dir) = setup_test_app();
        let response = app.oneshot(multipart("lease.pdf", FAKE_PDF)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let id = json["id"].as_str().unwrap();
        assert_eq!(id, crate::storage::compute_hash(FAKE_PDF));
        assert_eq!(json["file_name"], "lease.pdf");
        assert!(crate::storage::find_upload(&dir.path().join("uploads"), id).is_ok());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let (app, _dir) = setup_test_app();

        let response = app
            .clone()
            .oneshot(multipart("notes.txt", b"plain text"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Right extension, wrong content
        let response = app
            .oneshot(multipart("fake.pdf", b"GIF89a not a pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "InvalidFile");
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (app, _dir) = setup_test_app_with(16);
        let response = app.oneshot(multipart("big.pdf", FAKE_PDF)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_analyze_unknown_upload() {
        let (app, _dir) = setup_test_app();
        let response = app
            .oneshot(post_json(
                "/api/analyze",
                serde_json::json!({"upload_id": "0".repeat(64)}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_runs_empty_and_missing() {
        let (app, _dir) = setup_test_app();

        let response = app.clone().oneshot(get("/api/runs?limit=5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().map(Vec::len), Some(0));

        let response = app.oneshot(get("/api/runs/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
