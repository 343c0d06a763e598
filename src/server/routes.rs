//! Endpoint handlers and their JSON bodies.

use super::error::{public_message, status_for, ApiError};
use super::AppState;
use crate::error::PipelineError;
use crate::health::OcrStatus;
use crate::output::{EntitySet, OcrExchange, ProcessingResult, Table};
use crate::pipeline::extract::Document;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

// ── Bodies ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ocr_api_status: OcrStatus,
    pub max_text_length: usize,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub text: String,
    pub text_length: usize,
    pub page_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OcrResult<'a> {
    pub entities: &'a EntitySet,
    pub tables: &'a [Table],
}

/// Shared shape of `/process-pdf` and `/process-text`, success or failure.
#[derive(Debug, Serialize)]
pub struct ProcessResponse<'a> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<&'a str>,
    pub extracted_text: &'a str,
    pub ocr_result: OcrResult<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub chunks: &'a [OcrExchange],
}

impl<'a> ProcessResponse<'a> {
    pub fn new(filename: Option<&'a str>, result: &'a ProcessingResult) -> Self {
        Self {
            success: result.success(),
            filename,
            extracted_text: result.extracted_text(),
            ocr_result: OcrResult {
                entities: result.entities(),
                tables: result.tables(),
            },
            error: result.error().map(PipelineError::code),
            message: result.error().map(public_message),
            chunks: result.exchanges(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────

pub async fn index() -> Json<InfoResponse> {
    let endpoints = BTreeMap::from([
        ("health", "GET /health"),
        ("upload_pdf", "POST /upload-pdf"),
        ("process_pdf", "POST /process-pdf"),
        ("process_text", "POST /process-text"),
    ]);
    Json(InfoResponse {
        message: "PDF OCR Processing API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        ocr_api_status: state.pipeline.health().status(),
        max_text_length: state.pipeline.config().max_chunk_length,
    })
}

/// Extract text only.
pub async fn upload_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let document = read_upload(multipart?).await?;
    let extracted = state.pipeline.extract(&document).await?;
    info!(
        "Upload {}: {} pages, {} chars",
        document.file_name(),
        extracted.page_count,
        extracted.text.chars().count()
    );

    Ok(Json(UploadResponse {
        success: true,
        filename: document.file_name().to_string(),
        text_length: extracted.text.chars().count(),
        page_count: extracted.page_count,
        text: extracted.text,
    }))
}

pub async fn process_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match multipart {
        Ok(m) => read_upload(m).await,
        Err(rejection) => Err(PipelineError::Validation(rejection.body_text())),
    };
    let document = match upload {
        Ok(d) => d,
        Err(e) => return respond(None, &ProcessingResult::failed(String::new(), e, Vec::new())),
    };

    let result = state.pipeline.process_document(&document).await;
    respond(Some(document.file_name()), &result)
}

pub async fn process_text(
    State(state): State<AppState>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Response {
    let result = match body {
        Ok(Json(req)) => state.pipeline.process_text(&req.text).await,
        Err(rejection) => ProcessingResult::failed(
            String::new(),
            PipelineError::Validation(rejection.body_text()),
            Vec::new(),
        ),
    };
    respond(None, &result)
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn respond(filename: Option<&str>, result: &ProcessingResult) -> Response {
    let status = result.error().map(status_for).unwrap_or(StatusCode::OK);
    (status, Json(ProcessResponse::new(filename, result))).into_response()
}

/// Read the `file` field of a multipart upload into a validated document.
async fn read_upload(mut multipart: Multipart) -> Result<Document, PipelineError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {e}");
        PipelineError::Validation(format!("Malformed upload: {}", e.body_text()))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload bytes: {e}");
            PipelineError::Validation(format!("Failed to read file data: {e}"))
        })?;
        let document = Document::new(filename, bytes.to_vec());
        document.validate()?;
        return Ok(document);
    }
    Err(PipelineError::Validation(
        "No file uploaded (expected multipart field 'file')".into(),
    ))
}
