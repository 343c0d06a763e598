//! Configuration types for the extraction pipeline and the HTTP server.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share one config across request handlers, log it at startup,
//! and diff two deployments to understand why their outputs differ.

use crate::error::PipelineError;
use crate::progress::PipelineObserver;
use std::fmt;
use std::sync::Arc;

/// Default OCR endpoint: LM Studio's OpenAI-compatible chat completions API.
pub const DEFAULT_OCR_ENDPOINT: &str = "http://127.0.0.1:1234/v1/chat/completions";

/// Default model served behind [`DEFAULT_OCR_ENDPOINT`].
pub const DEFAULT_MODEL: &str = "olmocr-7b-0225-preview";

/// Configuration for one pipeline instance.
///
/// Built via [`PipelineConfig::builder()`] or using [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2data::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_chunk_length(2000)
///     .concurrency(4)
///     .ocr_endpoint("http://10.0.0.5:1234/v1/chat/completions")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Chat-completion URL of the OCR service.
    pub ocr_endpoint: String,

    /// URL probed by the health monitor. If None, derived from `ocr_endpoint`
    /// by replacing the trailing `/chat/completions` with `/models`.
    pub models_endpoint: Option<String>,

    /// Model identifier sent in every request. Default: `olmocr-7b-0225-preview`.
    pub model: String,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the model may generate per chunk. Default: 2048.
    pub max_tokens: usize,

    /// Maximum chunk length in characters. Default: 4000.
    ///
    /// Roughly matches what a 7B model with an 8k context can read while
    /// leaving room for the system prompt and a 2k-token reply.
    pub max_chunk_length: usize,

    /// Maximum number of concurrent OCR calls per request. Default: 3.
    ///
    /// A local LM Studio instance serialises generation internally, so a
    /// small number is enough to keep it busy without queueing timeouts.
    pub concurrency: usize,

    /// Automatic retries for transient OCR failures. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call OCR timeout in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Timeout of a single health probe in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// Interval between health probes in seconds. Default: 15.
    pub health_interval_secs: u64,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Delimiter placed between pages of extracted text. Default: form feed.
    pub page_separator: PageSeparator,

    /// Receives state transitions and per-chunk events. Default: None.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_endpoint: DEFAULT_OCR_ENDPOINT.to_string(),
            models_endpoint: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            max_chunk_length: 4000,
            concurrency: 3,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 30,
            probe_timeout_secs: 5,
            health_interval_secs: 15,
            system_prompt: None,
            page_separator: PageSeparator::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("ocr_endpoint", &self.ocr_endpoint)
            .field("models_endpoint", &self.models_endpoint())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_chunk_length", &self.max_chunk_length)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("health_interval_secs", &self.health_interval_secs)
            .field("page_separator", &self.page_separator)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The URL probed by the health monitor.
    pub fn models_endpoint(&self) -> String {
        if let Some(ref url) = self.models_endpoint {
            return url.clone();
        }
        let base = self.ocr_endpoint.trim_end_matches('/');
        match base.strip_suffix("/chat/completions") {
            Some(root) => format!("{root}/models"),
            None => base.to_string(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn ocr_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_endpoint = url.into();
        self
    }

    pub fn models_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.models_endpoint = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_chunk_length(mut self, n: usize) -> Self {
        self.config.max_chunk_length = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn health_interval_secs(mut self, secs: u64) -> Self {
        self.config.health_interval_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_chunk_length < 100 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_chunk_length must be ≥ 100, got {}",
                c.max_chunk_length
            )));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.health_interval_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "health_interval_secs must be ≥ 1".into(),
            ));
        }
        if c.probe_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "probe_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !c.ocr_endpoint.starts_with("http://") && !c.ocr_endpoint.starts_with("https://") {
            return Err(PipelineError::InvalidConfig(format!(
                "OCR endpoint must be an HTTP/HTTPS URL, got '{}'",
                c.ocr_endpoint
            )));
        }
        Ok(self.config)
    }
}

/// HTTP server settings, separate from the pipeline so the library can be
/// embedded without a listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on. Default: `0.0.0.0:8000`.
    pub bind: String,
    /// Origins allowed by CORS. Default: the local frontend dev server.
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes. Default: 50 MB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages in the extracted text.
///
/// The separator must be stable so that downstream consumers (and the
/// model) can tell where one page ends and the next begins.
#[derive(Debug, Clone, Default)]
pub enum PageSeparator {
    /// Form feed on its own line: "\n\u{000C}\n". (default)
    #[default]
    FormFeed,
    /// Blank line only: "\n\n". Page boundaries become indistinguishable
    /// from paragraph breaks.
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// Numbered marker: "\n\n--- Page N ---\n\n"
    PageMarker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed *before* the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::FormFeed => "\n\u{000C}\n".to_string(),
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::PageMarker => format!("\n\n--- Page {} ---\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lm_studio_setup() {
        let c = PipelineConfig::default();
        assert_eq!(c.ocr_endpoint, DEFAULT_OCR_ENDPOINT);
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_chunk_length, 4000);
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.concurrency, 3);
    }

    #[test]
    fn models_endpoint_derived_from_chat_endpoint() {
        let c = PipelineConfig::default();
        assert_eq!(c.models_endpoint(), "http://127.0.0.1:1234/v1/models");

        let c = PipelineConfig::builder()
            .ocr_endpoint("http://host:9/v1/chat/completions/")
            .build()
            .unwrap();
        assert_eq!(c.models_endpoint(), "http://host:9/v1/models");

        let c = PipelineConfig::builder()
            .models_endpoint("http://host:9/ping")
            .build()
            .unwrap();
        assert_eq!(c.models_endpoint(), "http://host:9/ping");
    }

    #[test]
    fn build_rejects_tiny_chunks() {
        let err = PipelineConfig::builder()
            .max_chunk_length(10)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_chunk_length"));
    }

    #[test]
    fn build_rejects_zero_probe_intervals() {
        let err = PipelineConfig::builder()
            .health_interval_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("health_interval_secs"));

        let err = PipelineConfig::builder()
            .probe_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("probe_timeout_secs"));
    }

    #[test]
    fn build_rejects_non_http_endpoint() {
        assert!(PipelineConfig::builder()
            .ocr_endpoint("ftp://nope")
            .build()
            .is_err());
    }

    #[test]
    fn concurrency_and_temperature_are_clamped() {
        let c = PipelineConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn page_separator_render() {
        assert_eq!(PageSeparator::FormFeed.render(2), "\n\u{000C}\n");
        assert_eq!(
            PageSeparator::PageMarker.render(3),
            "\n\n--- Page 3 ---\n\n"
        );
        assert_eq!(
            PageSeparator::Custom("~~".into()).render(1),
            "\n\n~~\n\n"
        );
    }
}
