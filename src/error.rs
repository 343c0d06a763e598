//! Error types for the edgequake-pdf2data library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the request cannot produce a result
//!   (not a PDF, corrupt container, OCR service unreachable after retries).
//!   Surfaced as `success: false` on the [`crate::output::ProcessingResult`]
//!   and mapped to an HTTP status by [`crate::server`].
//!
//! * [`OcrError`] — **Per call**: the classification of a single OCR attempt.
//!   Transient classes are retried by [`crate::pipeline::ocr::submit_with_retry`];
//!   whatever remains after the retry budget is converted into a
//!   [`PipelineError`].
//!
//! Unstructured model output is deliberately *not* an error at all: it is a
//! data-quality condition reported through
//! [`crate::pipeline::parse::ParsedReply::Unparsed`].

use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2data library.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request itself is unacceptable (missing file, not a `.pdf`, empty text).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The byte stream is not a parseable PDF container.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    DocumentCorrupt { detail: String },

    // ── OCR service errors ────────────────────────────────────────────────
    /// Connection to the OCR service failed, or the health monitor reports it offline.
    #[error("OCR service unavailable: {detail}")]
    ServiceUnavailable { detail: String },

    /// An OCR call exceeded the per-call timeout on every attempt.
    #[error("OCR service timed out after {secs}s")]
    ServiceTimeout { secs: u64 },

    /// The OCR service answered with a success status but no usable text.
    #[error("OCR service returned a malformed response: {detail}")]
    MalformedUpstreamResponse { detail: String },

    /// The OCR service rejected the request (4xx). Never retried.
    #[error("OCR service rejected the request (HTTP {status}): {detail}")]
    UpstreamRejected { status: u16, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code, used as the `error` field of HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::DocumentCorrupt { .. } => "DocumentCorrupt",
            PipelineError::ServiceUnavailable { .. } => "ServiceUnavailable",
            PipelineError::ServiceTimeout { .. } => "ServiceTimeout",
            PipelineError::MalformedUpstreamResponse { .. } => "MalformedUpstreamResponse",
            PipelineError::UpstreamRejected { .. } => "UpstreamRejected",
            PipelineError::InvalidConfig(_) => "InvalidConfig",
            PipelineError::Internal(_) => "Internal",
        }
    }

    /// `true` for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::DocumentCorrupt { .. }
        )
    }
}

/// Classification of one OCR attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OcrError {
    /// Could not connect, or the service answered 5xx.
    #[error("service unavailable: {detail}")]
    Unavailable { detail: String },

    /// The call did not complete within the per-call timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 2xx with an empty, non-JSON or content-less body.
    #[error("malformed response: {detail}")]
    Malformed { detail: String },

    /// 4xx — the request is wrong; retrying cannot help.
    #[error("rejected with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

impl OcrError {
    /// Only these classes are eligible for the automatic retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, OcrError::Rejected { .. })
    }
}

impl From<OcrError> for PipelineError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Unavailable { detail } => PipelineError::ServiceUnavailable { detail },
            OcrError::Timeout { secs } => PipelineError::ServiceTimeout { secs },
            OcrError::Malformed { detail } => PipelineError::MalformedUpstreamResponse { detail },
            OcrError::Rejected { status, detail } => {
                PipelineError::UpstreamRejected { status, detail }
            }
        }
    }
}
