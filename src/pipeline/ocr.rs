//! OCR service interaction: send one chunk, classify what comes back.
//!
//! The service is any OpenAI-compatible chat-completions endpoint (LM Studio
//! serving olmOCR by default). This module is intentionally thin: all prompt
//! wording lives in [`crate::prompts`] and all reply interpretation lives in
//! [`crate::pipeline::parse`], so neither can be changed by accident while
//! touching retry or error-handling logic here.
//!
//! ## Error Classification
//!
//! | Observation                               | Class         | Retried |
//! |-------------------------------------------|---------------|---------|
//! | connect failure, 5xx                      | `Unavailable` | yes     |
//! | no reply within the per-call timeout      | `Timeout`     | yes     |
//! | 2xx with empty / non-JSON / no content    | `Malformed`   | yes     |
//! | 4xx                                       | `Rejected`    | no      |
//!
//! ## Retry Strategy
//!
//! A local model server that is still loading weights answers 503 or drops
//! connections for a few seconds. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) gives it room without holding the
//! request for long: with the defaults one retry waits 500 ms.

use crate::config::PipelineConfig;
use crate::error::{OcrError, PipelineError};
use crate::prompts::ChatPrompt;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Longest slice of an error body kept in error details.
const MAX_DETAIL_CHARS: usize = 200;

/// A service that turns a prompt into reply text.
///
/// [`OcrClient`] is the HTTP implementation; tests substitute scripted
/// backends.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Issue exactly one request. No retries.
    async fn submit(&self, prompt: &ChatPrompt, timeout: Duration) -> Result<String, OcrError>;

    /// Lightweight reachability check. Never errors.
    async fn probe(&self) -> bool;
}

// ── HTTP implementation ──────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// reqwest client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    endpoint: String,
    models_endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    probe_timeout: Duration,
}

impl OcrClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.ocr_endpoint.clone(),
            models_endpoint: config.models_endpoint(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, prompt: &ChatPrompt) -> Result<String, OcrError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if status.is_client_error() {
            return Err(OcrError::Rejected {
                status: status.as_u16(),
                detail: truncate(&text),
            });
        }
        if !status.is_success() {
            return Err(OcrError::Unavailable {
                detail: format!("HTTP {}: {}", status.as_u16(), truncate(&text)),
            });
        }

        extract_content(&text)
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn submit(&self, prompt: &ChatPrompt, timeout: Duration) -> Result<String, OcrError> {
        match tokio::time::timeout(timeout, self.send(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn probe(&self) -> bool {
        let request = self.http.get(&self.models_endpoint).send();
        match tokio::time::timeout(self.probe_timeout, request).await {
            Ok(Ok(resp)) => {
                let online = resp.status().is_success();
                debug!("Probe {} → HTTP {}", self.models_endpoint, resp.status().as_u16());
                online
            }
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", self.models_endpoint, e);
                false
            }
            Err(_) => {
                debug!("Probe {} timed out", self.models_endpoint);
                false
            }
        }
    }
}

/// Pull `choices[0].message.content` out of a 2xx body.
pub fn extract_content(body: &str) -> Result<String, OcrError> {
    if body.trim().is_empty() {
        return Err(OcrError::Malformed {
            detail: "empty response body".into(),
        });
    }

    let json: Value = serde_json::from_str(body).map_err(|e| OcrError::Malformed {
        detail: format!("response is not JSON: {}", e),
    })?;

    match json.pointer("/choices/0/message/content") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(OcrError::Malformed {
            detail: "empty message content".into(),
        }),
        Some(_) => Err(OcrError::Malformed {
            detail: "message content is not a string".into(),
        }),
        None => Err(OcrError::Malformed {
            detail: "no content in OCR response".into(),
        }),
    }
}

fn classify_transport_error(e: reqwest::Error) -> OcrError {
    if e.is_timeout() {
        OcrError::Timeout { secs: 0 }
    } else {
        OcrError::Unavailable {
            detail: e.to_string(),
        }
    }
}

fn truncate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{cut}…")
    }
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Result of a submission including its retries.
#[derive(Debug, Clone)]
pub struct Submission {
    pub result: Result<String, OcrError>,
    pub attempts: u32,
    pub latency_ms: u64,
}

/// Submit a prompt, retrying transient failures up to `config.max_retries` times.
pub async fn submit_with_retry(
    backend: &dyn OcrBackend,
    prompt: &ChatPrompt,
    chunk_index: usize,
    config: &PipelineConfig,
) -> Submission {
    let start = Instant::now();
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let mut attempts = 0;

    let result = loop {
        if attempts > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempts - 1);
            warn!(
                chunk = chunk_index,
                "retry {}/{} after {}ms", attempts, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts += 1;

        match backend.submit(prompt, timeout).await {
            Ok(reply) => break Ok(reply),
            Err(e) => {
                // reqwest does not know our deadline; report the configured one.
                let e = match e {
                    OcrError::Timeout { secs: 0 } => OcrError::Timeout {
                        secs: config.api_timeout_secs,
                    },
                    other => other,
                };
                warn!(chunk = chunk_index, "attempt {} failed — {}", attempts, e);
                if !e.is_transient() || attempts > config.max_retries {
                    break Err(e);
                }
            }
        }
    };

    let latency_ms = start.elapsed().as_millis() as u64;
    debug!(chunk = chunk_index, latency_ms, attempts, "OCR submission finished");

    Submission {
        result,
        attempts,
        latency_ms,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of replies; repeats the last one when exhausted.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, OcrError>>>,
        last: Mutex<Option<Result<String, OcrError>>>,
        pub calls: AtomicUsize,
        pub online: bool,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<String, OcrError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                online: true,
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrBackend for ScriptedBackend {
        async fn submit(&self, _prompt: &ChatPrompt, _timeout: Duration) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(r) => {
                    *self.last.lock().unwrap() = Some(r.clone());
                    r
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Ok("{}".to_string())),
            }
        }

        async fn probe(&self) -> bool {
            self.online
        }
    }

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: "sys".into(),
            user: "text".into(),
        }
    }

    fn fast_config(max_retries: u32) -> PipelineConfig {
        PipelineConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn unavailable() -> OcrError {
        OcrError::Unavailable {
            detail: "connection refused".into(),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let backend = ScriptedBackend::new(vec![Err(unavailable()), Ok("reply".into())]);
        let s = submit_with_retry(&backend, &prompt(), 0, &fast_config(1)).await;
        assert_eq!(s.result.unwrap(), "reply");
        assert_eq!(s.attempts, 2);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_escalates() {
        let backend = ScriptedBackend::new(vec![Err(unavailable()), Err(unavailable())]);
        let s = submit_with_retry(&backend, &prompt(), 0, &fast_config(1)).await;
        assert_eq!(s.result.unwrap_err(), unavailable());
        assert_eq!(s.attempts, 2);
    }

    #[tokio::test]
    async fn rejected_is_never_retried() {
        let rejected = OcrError::Rejected {
            status: 400,
            detail: "unknown model".into(),
        };
        let backend = ScriptedBackend::new(vec![Err(rejected.clone()), Ok("never".into())]);
        let s = submit_with_retry(&backend, &prompt(), 0, &fast_config(3)).await;
        assert_eq!(s.result.unwrap_err(), rejected);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transport_timeout_reports_configured_deadline() {
        let backend = ScriptedBackend::new(vec![Err(OcrError::Timeout { secs: 0 })]);
        let s = submit_with_retry(&backend, &prompt(), 0, &fast_config(0)).await;
        assert_eq!(s.result.unwrap_err(), OcrError::Timeout { secs: 30 });
    }

    #[test]
    fn extract_content_reads_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"entities\":{}}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"entities":{}}"#);
    }

    #[test]
    fn extract_content_classifies_malformed_bodies() {
        for body in [
            "",
            "   ",
            "<html>502</html>",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":""}}]}"#,
            r#"{"choices":[{"message":{"content":42}}]}"#,
        ] {
            assert!(
                matches!(extract_content(body), Err(OcrError::Malformed { .. })),
                "body {body:?} should be malformed"
            );
        }
    }

    #[test]
    fn truncate_long_details() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).chars().count(), MAX_DETAIL_CHARS + 1);
        assert_eq!(truncate("  short "), "short");
    }

    #[test]
    fn client_uses_config_endpoints() {
        let config = PipelineConfig::builder()
            .ocr_endpoint("http://127.0.0.1:9/v1/chat/completions")
            .build()
            .unwrap();
        let client = OcrClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        assert_eq!(client.models_endpoint, "http://127.0.0.1:9/v1/models");
    }
}
