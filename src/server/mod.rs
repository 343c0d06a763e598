//! HTTP surface: an axum router over a shared [`Pipeline`].
//!
//! | Route           | Method | Body                |
//! |-----------------|--------|---------------------|
//! | `/`             | GET    | —                   |
//! | `/health`       | GET    | —                   |
//! | `/upload-pdf`   | POST   | multipart `file`    |
//! | `/process-pdf`  | POST   | multipart `file`    |
//! | `/process-text` | POST   | JSON `{"text": …}`  |
//!
//! Layers (outermost first): request tracing, CORS, body size limit.

pub mod error;
pub mod routes;

use crate::config::ServerConfig;
use crate::process::Pipeline;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the router. The health monitor is *not* started here.
pub fn build_router(pipeline: Arc<Pipeline>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/upload-pdf", post(routes::upload_pdf))
        .route("/process-pdf", post(routes::process_pdf))
        .route("/process-text", post(routes::process_text))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(pipeline: Arc<Pipeline>, config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(pipeline, &config))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::health::HealthMonitor;
    use crate::pipeline::ocr::tests::ScriptedBackend;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn router(replies: Vec<Result<String, crate::error::OcrError>>) -> Router {
        let pipeline = Pipeline::with_backend(
            PipelineConfig::default(),
            Arc::new(ScriptedBackend::new(replies)),
            Arc::new(HealthMonitor::new()),
        );
        build_router(Arc::new(pipeline), &ServerConfig::default())
    }

    async fn json_of(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn multipart(filename: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::post("/process-pdf")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_unknown_before_first_probe() {
        let response = router(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["ocr_api_status"], "unknown");
        assert_eq!(json["max_text_length"], 4000);
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let response = router(vec![])
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_of(response).await;
        assert_eq!(json["endpoints"]["process_pdf"], "POST /process-pdf");
    }

    #[tokio::test]
    async fn process_text_returns_entities() {
        let reply = r#"{"entities": {"names": ["Jane Doe"]}, "tables": []}"#;
        let response = router(vec![Ok(reply.into())])
            .oneshot(
                Request::post("/process-text")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text": "Jane Doe signed."}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["ocr_result"]["entities"]["names"][0], "Jane Doe");
        assert!(json.get("filename").is_none());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn process_text_rejects_empty_text() {
        let response = router(vec![])
            .oneshot(
                Request::post("/process-text")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "ValidationError");
    }

    #[tokio::test]
    async fn process_pdf_rejects_non_pdf_filename() {
        let response = router(vec![])
            .oneshot(multipart("notes.txt", b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "ValidationError");
    }

    #[tokio::test]
    async fn process_pdf_rejects_corrupt_pdf() {
        let response = router(vec![])
            .oneshot(multipart("broken.pdf", b"this is not a pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["error"], "DocumentCorrupt");
        assert_eq!(json["filename"], "broken.pdf");
    }

    #[tokio::test]
    async fn oversized_upload_reports_the_body_error() {
        let pipeline = Pipeline::with_backend(
            PipelineConfig::default(),
            Arc::new(ScriptedBackend::new(vec![])),
            Arc::new(HealthMonitor::new()),
        );
        let config = ServerConfig {
            max_upload_bytes: 64,
            ..ServerConfig::default()
        };
        let response = build_router(Arc::new(pipeline), &config)
            .oneshot(multipart("big.pdf", &[b'x'; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["error"], "ValidationError");
        let message = json["message"].as_str().unwrap();
        assert!(!message.contains("No file uploaded"), "got: {message}");
    }

    #[tokio::test]
    async fn upload_without_multipart_is_a_validation_error() {
        let response = router(vec![])
            .oneshot(
                Request::post("/upload-pdf")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "ValidationError");
    }
}
