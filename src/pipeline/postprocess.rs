//! Post-processing: deterministic cleanup of text pulled out of a PDF page.
//!
//! Text layers in real-world PDFs carry artefacts that are invisible in a
//! viewer but waste model context and confuse entity matching:
//!
//! - Windows-style `\r\n` (or bare `\r`) line endings from the producer
//! - Zero-width spaces, BOMs and soft hyphens inserted by typesetting tools
//! - Trailing spaces used for justification
//! - Long runs of blank lines where the layout had vertical whitespace
//!
//! Each rule is a pure `&str → String` function so it can be tested alone.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule only has to deal
//! with `\n`; invisible characters go before whitespace trimming because a
//! trailing ZWSP would otherwise shield the spaces in front of it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF/CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Trim leading/trailing blank space of the page
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
