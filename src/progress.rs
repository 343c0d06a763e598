//! Observer trait for pipeline state transitions and per-chunk events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as a
//! request moves through the state machine and its chunks are submitted.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2data::{PipelineConfig, PipelineObserver, PipelineState};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder {
//!     states: Mutex<Vec<PipelineState>>,
//! }
//!
//! impl PipelineObserver for Recorder {
//!     fn on_state_change(&self, state: PipelineState) {
//!         self.states.lock().unwrap().push(state);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(Recorder::default()) as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::process::PipelineState;

/// Called by the pipeline as it processes a request.
///
/// Implementations must be `Send + Sync`: chunk events fire from concurrent
/// OCR calls. All methods have default no-op implementations so callers only
/// override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// Called on every state transition, including the terminal one.
    fn on_state_change(&self, state: PipelineState) {
        let _ = state;
    }

    /// Called once the chunk plan is known.
    fn on_chunks_planned(&self, total_chunks: usize, text_len: usize) {
        let _ = (total_chunks, text_len);
    }

    /// Called just before the first OCR attempt for a chunk.
    ///
    /// # Arguments
    /// * `chunk_index`  — 0-indexed chunk number
    /// * `total_chunks` — total chunks in the request
    fn on_chunk_start(&self, chunk_index: usize, total_chunks: usize) {
        let _ = (chunk_index, total_chunks);
    }

    /// Called when a chunk's reply has been received and parsed.
    /// `structured` is false when the reply degraded to raw text.
    fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, structured: bool) {
        let _ = (chunk_index, total_chunks, structured);
    }

    /// Called when a chunk fails terminally after its retries.
    fn on_chunk_error(&self, chunk_index: usize, total_chunks: usize, error: &str) {
        let _ = (chunk_index, total_chunks, error);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}
