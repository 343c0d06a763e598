//! Pipeline stages for PDF-to-structured-data extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different OCR backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ chunk ──▶ ocr ──▶ parse
//! (lopdf)    (split)   (HTTP)  (JSON)
//! ```
//!
//! 1. [`extract`] — pull page-ordered text out of the PDF; runs in
//!    `spawn_blocking` because parsing is CPU-bound
//! 2. [`postprocess`] — deterministic cleanup of each page's text
//! 3. [`chunk`] — split the text into model-sized pieces
//! 4. [`ocr`] — drive the OCR call with retry/backoff; the only stage with
//!    network I/O
//! 5. [`parse`] — locate and coerce the JSON block in each reply

pub mod chunk;
pub mod extract;
pub mod ocr;
pub mod parse;
pub mod postprocess;
