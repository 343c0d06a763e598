//! Request orchestration: one document (or text) in, one result out.
//!
//! Every request walks the same state machine:
//!
//! ```text
//! Idle ─▶ Extracting ─▶ Chunking ─▶ AwaitingOcr ─▶ Parsing ─▶ Merging ─▶ Completed
//!              │             │            │
//!              └─────────────┴────────────┴──────────▶ Failed
//! ```
//!
//! Text requests start at `Chunking`. Transitions are logged at `debug` and
//! forwarded to the configured [`PipelineObserver`].
//!
//! ## Failure policy
//!
//! Chunks are submitted concurrently. The first chunk whose OCR call fails
//! terminally (after its retries) fails the whole request: the remaining
//! in-flight calls are cancelled by dropping the stream, and no partial
//! entities are returned. An *unstructured* reply is not a failure; that
//! chunk simply contributes nothing.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::health::{HealthMonitor, MonitorHandle, OcrStatus};
use crate::output::{EntitySet, ExchangeOutcome, OcrExchange, ProcessingResult, Table};
use crate::pipeline::chunk::{plan_chunks, TextChunk};
use crate::pipeline::extract::{extract_document, Document, ExtractedText};
use crate::pipeline::ocr::{submit_with_retry, OcrBackend, OcrClient, Submission};
use crate::pipeline::parse::{parse_reply, ParsedReply};
use crate::progress::PipelineObserver;
use crate::prompts::{build_prompt, ChatPrompt};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Extracting,
    Chunking,
    AwaitingOcr,
    Parsing,
    Merging,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared, immutable entry point. Wrap in `Arc` and clone per request.
pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn OcrBackend>,
    health: Arc<HealthMonitor>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("health", &self.health.status())
            .finish()
    }
}

impl Pipeline {
    /// Pipeline talking HTTP to `config.ocr_endpoint`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = OcrClient::new(&config)?;
        Ok(Self::with_backend(
            config,
            Arc::new(client),
            Arc::new(HealthMonitor::new()),
        ))
    }

    /// Pipeline with a caller-supplied backend and monitor.
    pub fn with_backend(
        config: PipelineConfig,
        backend: Arc<dyn OcrBackend>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            config,
            backend,
            health,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn backend(&self) -> &Arc<dyn OcrBackend> {
        &self.backend
    }

    /// Start probing the backend every `health_interval_secs`.
    pub fn start_health_monitor(&self) -> MonitorHandle {
        self.health.spawn(
            Arc::clone(&self.backend),
            Duration::from_secs(self.config.health_interval_secs),
        )
    }

    /// Extract text only. No OCR, no health gate.
    pub async fn extract(&self, document: &Document) -> Result<ExtractedText, PipelineError> {
        document.validate()?;
        extract_document(document, &self.config.page_separator).await
    }

    /// Run the full pipeline on an uploaded PDF.
    pub async fn process_document(&self, document: &Document) -> ProcessingResult {
        let total_start = Instant::now();
        let mut run = Run::new(self.config.observer.as_deref());
        info!("Processing document: {}", document.file_name());

        // ── Step 1: Extract text ─────────────────────────────────────────
        run.enter(PipelineState::Extracting);
        let extracted = match self.extract(document).await {
            Ok(e) => e,
            Err(e) => return run.fail(String::new(), e, Vec::new()),
        };

        let result = self.process_extracted(run, extracted.text).await;
        info!(
            "Finished {} in {}ms (success: {})",
            document.file_name(),
            total_start.elapsed().as_millis(),
            result.success()
        );
        result
    }

    /// Run the pipeline on text that is already extracted.
    pub async fn process_text(&self, text: &str) -> ProcessingResult {
        let run = Run::new(self.config.observer.as_deref());
        if text.trim().is_empty() {
            return run.fail(
                String::new(),
                PipelineError::Validation("Text cannot be empty".into()),
                Vec::new(),
            );
        }
        self.process_extracted(run, text.to_string()).await
    }

    async fn process_extracted(&self, mut run: Run<'_>, text: String) -> ProcessingResult {
        // ── Step 2: Plan chunks ──────────────────────────────────────────
        run.enter(PipelineState::Chunking);
        let chunks = plan_chunks(&text, self.config.max_chunk_length);
        let text_len = text.chars().count();
        info!("Planned {} chunks for {} chars", chunks.len(), text_len);
        if let Some(o) = run.observer {
            o.on_chunks_planned(chunks.len(), text_len);
        }

        if chunks.is_empty() {
            run.enter(PipelineState::Merging);
            run.enter(PipelineState::Completed);
            return ProcessingResult::succeeded(text, EntitySet::new(), Vec::new(), Vec::new());
        }

        // ── Step 3: Health gate ──────────────────────────────────────────
        if self.health.status() == OcrStatus::Offline {
            return run.fail(
                text,
                PipelineError::ServiceUnavailable {
                    detail: "health monitor reports the OCR service offline".into(),
                },
                Vec::new(),
            );
        }

        // ── Step 4: Submit chunks ────────────────────────────────────────
        run.enter(PipelineState::AwaitingOcr);
        let replies = match self.submit_all(&chunks, run.observer).await {
            Ok(r) => r,
            Err((err, exchanges)) => return run.fail(text, err, exchanges),
        };

        // ── Step 5: Parse replies ────────────────────────────────────────
        run.enter(PipelineState::Parsing);
        let total = chunks.len();
        let parsed: Vec<(ChunkReply, ParsedReply)> = replies
            .into_values()
            .map(|reply| {
                let parsed = parse_reply(&reply.raw);
                if let Some(o) = run.observer {
                    o.on_chunk_complete(reply.index, total, parsed.is_parsed());
                }
                (reply, parsed)
            })
            .collect();

        // ── Step 6: Merge in chunk order ─────────────────────────────────
        run.enter(PipelineState::Merging);
        let mut entities = EntitySet::new();
        let mut tables: Vec<Table> = Vec::new();
        let mut exchanges = Vec::with_capacity(parsed.len());

        for (reply, parsed) in parsed {
            let (outcome, notes) = match parsed {
                ParsedReply::Parsed {
                    entities: e,
                    tables: t,
                    notes,
                } => {
                    entities.merge(&e);
                    tables.extend(t);
                    (ExchangeOutcome::Parsed, notes)
                }
                ParsedReply::Unparsed { .. } => (ExchangeOutcome::Unparsed, Vec::new()),
            };
            exchanges.push(reply.into_exchange(outcome, notes));
        }

        let extracted_text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        info!(
            "Merged {} chunks: {} names, {} dates, {} addresses, {} tables",
            total,
            entities.names().len(),
            entities.dates().len(),
            entities.addresses().len(),
            tables.len()
        );

        run.enter(PipelineState::Completed);
        ProcessingResult::succeeded(extracted_text, entities, tables, exchanges)
    }

    /// Submit every chunk with at most `concurrency` calls in flight.
    ///
    /// Returns replies keyed by chunk index, or the first terminal failure.
    async fn submit_all(
        &self,
        chunks: &[TextChunk],
        observer: Option<&dyn PipelineObserver>,
    ) -> Result<BTreeMap<usize, ChunkReply>, (PipelineError, Vec<OcrExchange>)> {
        let total = chunks.len();
        let backend = self.backend.as_ref();
        let config = &self.config;

        // Collected first: a lazy `map` adapter here makes the future non-`Send`.
        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let prompt = build_prompt(chunk, config);
                async move {
                    if let Some(o) = observer {
                        o.on_chunk_start(chunk.index, total);
                    }
                    let submission =
                        submit_with_retry(backend, &prompt, chunk.index, config).await;
                    (chunk.index, prompt, submission)
                }
            })
            .collect();
        let mut in_flight = stream::iter(calls).buffer_unordered(config.concurrency);

        let mut replies = BTreeMap::new();
        while let Some((index, prompt, submission)) = in_flight.next().await {
            let Submission {
                result,
                attempts,
                latency_ms,
            } = submission;

            match result {
                Ok(raw) => {
                    debug!(chunk = index, latency_ms, attempts, "reply received");
                    replies.insert(
                        index,
                        ChunkReply {
                            index,
                            prompt,
                            raw,
                            attempts,
                            latency_ms,
                        },
                    );
                }
                Err(e) => {
                    error!(chunk = index, "OCR failed after {} attempts: {}", attempts, e);
                    if let Some(o) = observer {
                        o.on_chunk_error(index, total, &e.to_string());
                    }
                    let exchange = OcrExchange {
                        chunk_index: index,
                        prompt_text: prompt.prompt_text(),
                        raw_reply: None,
                        latency_ms,
                        attempts,
                        outcome: ExchangeOutcome::Failed { error: e.clone() },
                        notes: Vec::new(),
                    };
                    // Dropping `in_flight` cancels the calls still running.
                    return Err((e.into(), vec![exchange]));
                }
            }
        }
        Ok(replies)
    }
}

/// A successful reply waiting to be parsed.
struct ChunkReply {
    index: usize,
    prompt: ChatPrompt,
    raw: String,
    attempts: u32,
    latency_ms: u64,
}

impl ChunkReply {
    fn into_exchange(self, outcome: ExchangeOutcome, notes: Vec<String>) -> OcrExchange {
        OcrExchange {
            chunk_index: self.index,
            prompt_text: self.prompt.prompt_text(),
            raw_reply: Some(self.raw),
            latency_ms: self.latency_ms,
            attempts: self.attempts,
            outcome,
            notes,
        }
    }
}

/// State tracking for one request.
struct Run<'a> {
    state: PipelineState,
    observer: Option<&'a dyn PipelineObserver>,
}

impl<'a> Run<'a> {
    fn new(observer: Option<&'a dyn PipelineObserver>) -> Self {
        Self {
            state: PipelineState::Idle,
            observer,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug!("Pipeline state {} → {}", self.state, next);
        self.state = next;
        if let Some(o) = self.observer {
            o.on_state_change(next);
        }
    }

    fn fail(
        mut self,
        extracted_text: String,
        error: PipelineError,
        exchanges: Vec<OcrExchange>,
    ) -> ProcessingResult {
        if error.is_client_error() {
            warn!("Request rejected during {}: {}", self.state, error);
        } else {
            error!("Request failed during {}: {}", self.state, error);
        }
        self.enter(PipelineState::Failed);
        ProcessingResult::failed(extracted_text, error, exchanges)
    }
}
