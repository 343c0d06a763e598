//! Chunk planning: split extracted text into model-sized pieces.
//!
//! The OCR model has a bounded context, so long documents are cut into
//! chunks of at most `max_chunk_length` characters. Cuts prefer whitespace
//! so words stay whole; a window with no whitespace at all is hard-split.
//!
//! ## Trailing slivers
//!
//! A naive greedy split often leaves a last chunk of a handful of characters,
//! which costs a full model round trip for almost no content. When the tail
//! would be shorter than 10% of the limit, the last two chunks are rebalanced
//! around the midpoint of the remaining text instead. Both halves stay within
//! the limit.
//!
//! Lengths and offsets are counted in `char`s, never bytes, so multi-byte
//! text is never cut inside a code point.

use serde::Serialize;

/// Tail chunks shorter than this percentage of the limit are rebalanced.
const SLIVER_PERCENT: usize = 10;

/// One contiguous slice of the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// 0-based position in the plan.
    pub index: usize,
    pub content: String,
    /// Offset of the first character, in chars from the start of the text.
    pub char_offset: usize,
}

impl TextChunk {
    /// Length in chars.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Split `text` into ordered chunks that concatenate back to `text`.
///
/// Empty input yields no chunks. A `max_chunk_length` of 0 is treated as 1.
pub fn plan_chunks(text: &str, max_chunk_length: usize) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let max = max_chunk_length.max(1);
    let min_tail = max * SLIVER_PERCENT / 100;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let mut end = split_point(&chars, start, max, start + 1);

        let tail = n - end;
        if tail > 0 && tail < min_tail {
            // Cut near the middle, but late enough that the rest fits in one chunk.
            let remaining = n - start;
            end = split_point(&chars, start, remaining.div_ceil(2), n - max);
        }

        chunks.push(TextChunk {
            index: chunks.len(),
            content: chars[start..end].iter().collect(),
            char_offset: start,
        });
        start = end;
    }

    chunks
}

/// End (exclusive) of the chunk beginning at `start`.
///
/// Cuts at `start + limit` if the next char is whitespace, otherwise right
/// after the last whitespace in the window that still yields an end of at
/// least `min_end`. Falls back to a hard split at the limit.
fn split_point(chars: &[char], start: usize, limit: usize, min_end: usize) -> usize {
    let hard = start + limit;
    if hard >= chars.len() {
        return chars.len();
    }
    if chars[hard].is_whitespace() {
        return hard;
    }

    let lowest = min_end.max(start + 1) - 1;
    (lowest..hard)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(hard)
}
