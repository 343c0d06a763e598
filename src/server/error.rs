//! HTTP error mapping.

use crate::error::PipelineError;
use axum::extract::multipart::MultipartRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Failure body for endpoints that do not return a processing result.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Pipeline(PipelineError::Validation(rejection.body_text()))
    }
}

/// HTTP status for a fatal pipeline error.
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Validation(_) | PipelineError::DocumentCorrupt { .. } => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::ServiceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::MalformedUpstreamResponse { .. } | PipelineError::UpstreamRejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Client-facing description. Internal details stay in the logs.
pub fn public_message(error: &PipelineError) -> String {
    match error {
        PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => {
            tracing::error!(detail = %error, "API internal error");
            "An internal error occurred".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Pipeline(err) = self;
        let body = ErrorBody {
            success: false,
            error: err.code(),
            message: public_message(&err),
        };
        (status_for(&err), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn json_of(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_returns_400() {
        let response = ApiError::from(PipelineError::Validation("Only PDF files are allowed".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "ValidationError");
        assert!(json["message"].as_str().unwrap().contains("Only PDF"));
    }

    #[tokio::test]
    async fn corrupt_document_returns_400() {
        let response = ApiError::from(PipelineError::DocumentCorrupt {
            detail: "missing %PDF header".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "DocumentCorrupt");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::from(PipelineError::Internal("join error".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(response).await["message"], "An internal error occurred");
    }

    #[test]
    fn upstream_errors_map_to_gateway_statuses() {
        assert_eq!(
            status_for(&PipelineError::ServiceUnavailable { detail: "x".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&PipelineError::ServiceTimeout { secs: 30 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&PipelineError::MalformedUpstreamResponse { detail: "x".into() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PipelineError::UpstreamRejected {
                status: 400,
                detail: "x".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
