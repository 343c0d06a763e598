//! Response parsing: find the JSON block in a model reply and coerce it.
//!
//! Small local models rarely answer with *only* the requested object. Typical
//! replies wrap it in prose ("Sure! Here is the data:"), in a ```` ```json ````
//! fence, or bend the shape: a bare string where a list was asked for, a
//! single table object instead of a list, rows given as objects keyed by
//! header. This module accepts all of that and never fails: a reply without
//! a usable block degrades to [`ParsedReply::Unparsed`].
//!
//! ## Locating the block
//!
//! Every `{` in the reply is tried in order as the start of one JSON value,
//! decoded with a streaming deserializer so whatever follows the value is
//! ignored. The first *object* carrying at least one expected key wins.
//! Code fences need no special handling because the fence markers are never
//! part of the decoded value.

use crate::output::{EntityKind, EntitySet, Table};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys that mark an object as the structured block.
const EXPECTED_KEYS: [&str; 5] = ["entities", "names", "dates", "addresses", "tables"];

/// Outcome of parsing one reply. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Parsed {
        entities: EntitySet,
        tables: Vec<Table>,
        /// Data-quality notes (coercions, padded rows).
        notes: Vec<String>,
    },
    /// No structured block was found; the chunk contributes nothing.
    Unparsed { raw: String },
}

impl ParsedReply {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParsedReply::Parsed { .. })
    }
}

/// Parse a model reply.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let Some(block) = find_block(raw) else {
        warn!(
            "No structured block in reply ({} chars); chunk degraded",
            raw.chars().count()
        );
        return ParsedReply::Unparsed {
            raw: raw.to_string(),
        };
    };

    let mut notes = Vec::new();
    let entities = decode_entities(&block, &mut notes);
    let tables = decode_tables(&block, &mut notes);

    debug!(
        "Parsed reply: {} entities, {} tables, {} notes",
        entities.len(),
        tables.len(),
        notes.len()
    );

    ParsedReply::Parsed {
        entities,
        tables,
        notes,
    }
}

fn find_block(raw: &str) -> Option<Map<String, Value>> {
    for (i, _) in raw.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&raw[i..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = values.next() {
            if EXPECTED_KEYS.iter().any(|k| map.contains_key(*k)) {
                return Some(map);
            }
        }
    }
    None
}

// ── Entities ─────────────────────────────────────────────────────────────

fn decode_entities(block: &Map<String, Value>, notes: &mut Vec<String>) -> EntitySet {
    let source = match block.get("entities") {
        Some(Value::Object(inner)) => inner,
        Some(Value::Null) | None => block,
        Some(_) => {
            notes.push("entities: not an object, reading top-level keys".into());
            block
        }
    };

    let mut set = EntitySet::new();
    for kind in EntityKind::ALL {
        let Some(value) = source.get(kind.key()) else {
            continue;
        };
        if matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
            notes.push(format!("entities.{}: scalar coerced to list", kind.key()));
        }
        let mut values = Vec::new();
        collect_scalars(value, &mut values);
        for v in values {
            set.insert(kind, v);
        }
    }
    set
}

/// Flatten a value into its scalar leaves as strings. `null` is skipped.
fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_scalars(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, out)),
    }
}

// ── Tables ───────────────────────────────────────────────────────────────

fn decode_tables(block: &Map<String, Value>, notes: &mut Vec<String>) -> Vec<Table> {
    let raw_tables: Vec<&Value> = match block.get("tables") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => {
            notes.push("tables: single object coerced to list".into());
            vec![obj]
        }
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            notes.push("tables: unexpected value ignored".into());
            Vec::new()
        }
    };

    let mut tables = Vec::new();
    for (i, value) in raw_tables.into_iter().enumerate() {
        let Value::Object(obj) = value else {
            notes.push(format!("table {}: not an object, skipped", i + 1));
            continue;
        };
        let (headers, rows) = decode_table(obj);
        if headers.is_empty() && rows.is_empty() {
            continue;
        }
        let (table, table_notes) = Table::normalize(headers, rows);
        notes.extend(
            table_notes
                .into_iter()
                .map(|n| format!("table {}: {}", i + 1, n)),
        );
        tables.push(table);
    }
    tables
}

fn decode_table(obj: &Map<String, Value>) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers: Vec<String> = match obj.get("headers") {
        Some(Value::Array(items)) => items.iter().map(cell_text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![cell_text(other)],
    };

    let raw_rows: Vec<&Value> = match obj.get("rows") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    };

    // Object rows without headers: take the first row's keys.
    if headers.is_empty() {
        if let Some(Value::Object(first)) = raw_rows.first() {
            headers = first.keys().cloned().collect();
        }
    }

    let rows = raw_rows
        .into_iter()
        .filter(|row| !row.is_null())
        .map(|row| match row {
            Value::Array(cells) => cells.iter().map(cell_text).collect(),
            Value::Object(cells) => headers
                .iter()
                .map(|h| cells.get(h).map(cell_text).unwrap_or_default())
                .collect(),
            scalar => vec![cell_text(scalar)],
        })
        .collect();

    (headers, rows)
}

/// Stringify a table cell. Nested values are rendered as compact JSON.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        nested => nested.to_string(),
    }
}
