//! Result types produced by the pipeline.
//!
//! [`EntitySet`] and [`Table`] keep their invariants behind private fields:
//! an entity field never holds the same string twice, and every table row
//! is exactly as wide as the header row. Both are built incrementally by the
//! response parser and merged by the orchestrator, so enforcing the rules at
//! the type boundary means no caller can observe a half-normalised value.

use crate::error::{OcrError, PipelineError};
use serde::Serialize;
use tracing::warn;

// ── Entities ─────────────────────────────────────────────────────────────

/// Which field of an [`EntitySet`] a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Name,
    Date,
    Address,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Name, EntityKind::Date, EntityKind::Address];

    /// JSON key used by the model and by the HTTP response.
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Name => "names",
            EntityKind::Date => "dates",
            EntityKind::Address => "addresses",
        }
    }
}

/// Names, dates and addresses found in a document.
///
/// Each field is an insertion-ordered set: duplicates (case-sensitive exact
/// match after trimming) are suppressed, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySet {
    names: Vec<String>,
    dates: Vec<String>,
    addresses: Vec<String>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning `true` if it was new.
    ///
    /// Values are trimmed; empty values are ignored.
    pub fn insert(&mut self, kind: EntityKind, value: impl AsRef<str>) -> bool {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return false;
        }
        let field = self.field_mut(kind);
        if field.iter().any(|v| v == value) {
            return false;
        }
        field.push(value.to_string());
        true
    }

    /// Union `other` into `self`, preserving `self`'s order first.
    pub fn merge(&mut self, other: &EntitySet) {
        for kind in EntityKind::ALL {
            for value in other.get(kind) {
                self.insert(kind, value);
            }
        }
    }

    pub fn get(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Name => &self.names,
            EntityKind::Date => &self.dates,
            EntityKind::Address => &self.addresses,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.names.len() + self.dates.len() + self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn field_mut(&mut self, kind: EntityKind) -> &mut Vec<String> {
        match kind {
            EntityKind::Name => &mut self.names,
            EntityKind::Date => &mut self.dates,
            EntityKind::Address => &mut self.addresses,
        }
    }
}

// ── Tables ───────────────────────────────────────────────────────────────

/// A table whose rows all have `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, padding short rows with `""` and truncating long ones.
    ///
    /// Returns the table together with one data-quality note per adjusted
    /// row. When `headers` is empty the width is taken from the widest row
    /// and headers `column_1..column_n` are synthesised.
    pub fn normalize(headers: Vec<String>, rows: Vec<Vec<String>>) -> (Table, Vec<String>) {
        let mut notes = Vec::new();
        let headers = if headers.is_empty() {
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            if width > 0 {
                notes.push(format!("no headers; synthesised {width} column names"));
            }
            (1..=width).map(|i| format!("column_{i}")).collect()
        } else {
            headers
        };
        let width = headers.len();

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                let len = row.len();
                if len < width {
                    row.resize(width, String::new());
                    notes.push(format!("row {}: padded {} → {} cells", i + 1, len, width));
                } else if len > width {
                    row.truncate(width);
                    notes.push(format!("row {}: truncated {} → {} cells", i + 1, len, width));
                }
                row
            })
            .collect();

        for note in &notes {
            warn!("Table normalisation: {}", note);
        }

        (Table { headers, rows }, notes)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

}

// ── Per-chunk diagnostics ────────────────────────────────────────────────

/// How a chunk's OCR exchange ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// A structured block was found and decoded.
    Parsed,
    /// The reply had no structured block; the chunk contributes nothing.
    Unparsed,
    /// Transport failed terminally.
    Failed { error: OcrError },
}

/// One chunk's round trip to the OCR service.
#[derive(Debug, Clone, Serialize)]
pub struct OcrExchange {
    pub chunk_index: usize,
    /// Rendered prompt; omitted from serialised output because it repeats
    /// the document text.
    #[serde(skip)]
    pub prompt_text: String,
    /// The model's reply text, if any attempt produced one.
    pub raw_reply: Option<String>,
    /// Wall-clock time across all attempts.
    pub latency_ms: u64,
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: ExchangeOutcome,
    /// Data-quality notes raised while parsing (table padding, coercions).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

// ── Final result ─────────────────────────────────────────────────────────

/// Final outcome of one request. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    extracted_text: String,
    entities: EntitySet,
    tables: Vec<Table>,
    error: Option<PipelineError>,
    exchanges: Vec<OcrExchange>,
}

impl ProcessingResult {
    pub(crate) fn succeeded(
        extracted_text: String,
        entities: EntitySet,
        tables: Vec<Table>,
        exchanges: Vec<OcrExchange>,
    ) -> Self {
        Self {
            extracted_text,
            entities,
            tables,
            error: None,
            exchanges,
        }
    }

    pub(crate) fn failed(
        extracted_text: String,
        error: PipelineError,
        exchanges: Vec<OcrExchange>,
    ) -> Self {
        Self {
            extracted_text,
            entities: EntitySet::default(),
            tables: Vec::new(),
            error: Some(error),
            exchanges,
        }
    }

    /// `true` when extraction and transport succeeded, even if some chunks
    /// degraded to empty entities.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn extracted_text(&self) -> &str {
        &self.extracted_text
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    /// Human-readable failure description.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn exchanges(&self) -> &[OcrExchange] {
        &self.exchanges
    }

    /// Number of chunks whose reply could not be parsed.
    pub fn degraded_chunks(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|e| e.outcome == ExchangeOutcome::Unparsed)
            .count()
    }
}
