//! # edgequake-pdf2data
//!
//! Extract names, dates, addresses and tables from PDF documents using a
//! locally hosted OCR language model (olmOCR behind LM Studio by default).
//!
//! ## Why this crate?
//!
//! Plain text extraction gives you a wall of characters; regexes over that
//! text break on every new document layout. This crate extracts the PDF's
//! text layer, splits it into model-sized chunks, asks the model for one
//! JSON object per chunk, and merges the answers into a single de-duplicated
//! result. Everything runs on your own machine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract  page text via lopdf (CPU-bound, spawn_blocking)
//!  ├─ 2. Clean    line endings, invisible chars, blank-line runs
//!  ├─ 3. Chunk    whitespace-aware split, ≤ max_chunk_length chars
//!  ├─ 4. OCR      concurrent chat-completion calls with retry
//!  ├─ 5. Parse    tolerant JSON block extraction and coercion
//!  └─ 6. Merge    de-duplicated entities + concatenated tables
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2data::{Document, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig::default())?;
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let result = pipeline
//!         .process_document(&Document::new("invoice.pdf", bytes))
//!         .await;
//!     println!("names: {:?}", result.entities().names());
//!     println!("tables: {}", result.tables().len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2data` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2data = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod health;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    PageSeparator, PipelineConfig, PipelineConfigBuilder, ServerConfig, DEFAULT_MODEL,
    DEFAULT_OCR_ENDPOINT,
};
pub use error::{OcrError, PipelineError};
pub use health::{HealthMonitor, MonitorHandle, OcrStatus};
pub use output::{EntityKind, EntitySet, ExchangeOutcome, OcrExchange, ProcessingResult, Table};
pub use pipeline::chunk::{plan_chunks, TextChunk};
pub use pipeline::extract::{Document, ExtractedText};
pub use pipeline::ocr::{OcrBackend, OcrClient};
pub use pipeline::parse::{parse_reply, ParsedReply};
pub use process::{Pipeline, PipelineState};
pub use progress::{NoopObserver, PipelineObserver};
pub use prompts::{build_prompt, ChatPrompt};
pub use server::{build_router, serve};
