//! Text extraction: PDF bytes → page-ordered plain text via lopdf.
//!
//! ## Why lopdf?
//!
//! The OCR model receives *text*, not page images, so there is no need for
//! a rasteriser. lopdf parses the container and decodes `Tj`/`TJ` operators
//! in pure Rust, which keeps the server free of native library setup.
//!
//! ## Why spawn_blocking?
//!
//! Parsing and decompressing content streams is CPU-bound and can take
//! hundreds of milliseconds for large documents. [`extract_document`] moves
//! the work onto Tokio's blocking pool so request handlers never stall a
//! worker thread.
//!
//! ## Empty documents
//!
//! A valid PDF without a text layer (a pure image scan) is *not* an error:
//! the result is empty text and downstream stages produce an empty result.

use crate::config::PageSeparator;
use crate::error::PipelineError;
use crate::pipeline::postprocess::clean_page_text;
use tracing::{debug, info, warn};

/// An uploaded PDF. Lives only for the duration of one request.
#[derive(Debug, Clone)]
pub struct Document {
    file_name: String,
    raw_bytes: Vec<u8>,
}

impl Document {
    pub fn new(file_name: impl Into<String>, raw_bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            raw_bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Reject uploads that are not PDFs by name or are empty.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.file_name.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::Validation(format!(
                "Only PDF files are allowed, got '{}'",
                self.file_name
            )));
        }
        if self.raw_bytes.is_empty() {
            return Err(PipelineError::Validation(format!(
                "Uploaded file '{}' is empty",
                self.file_name
            )));
        }
        Ok(())
    }
}

/// Text extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Page texts joined with the configured separator; `""` if no page has text.
    pub text: String,
    /// Number of pages in the document.
    pub page_count: usize,
    /// 1-indexed pages without any extractable text.
    pub empty_pages: Vec<usize>,
}

impl ExtractedText {
    /// `true` when the document has no text layer at all.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Check that the bytes start with `%PDF`, ignoring leading whitespace.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF")
}

/// Extract page-ordered text from PDF bytes.
///
/// Pages are cleaned individually and joined with `separator`. Empty pages
/// keep their separator so page positions survive, unless *every* page is
/// empty, in which case the text is `""`.
///
/// # Errors
/// [`PipelineError::DocumentCorrupt`] when the bytes are not a parseable PDF.
pub fn extract_text(bytes: &[u8], separator: &PageSeparator) -> Result<ExtractedText, PipelineError> {
    if !has_pdf_magic(bytes) {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PipelineError::DocumentCorrupt {
            detail: format!("missing %PDF header (first bytes: {:?})", magic),
        });
    }

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| PipelineError::DocumentCorrupt {
        detail: e.to_string(),
    })?;

    // BTreeMap: already sorted by page number.
    let pages = doc.get_pages();
    let page_count = pages.len();

    let mut page_texts = Vec::with_capacity(page_count);
    let mut empty_pages = Vec::new();

    for (position, page_num) in pages.keys().enumerate() {
        let text = match doc.extract_text(&[*page_num]) {
            Ok(raw) => clean_page_text(&raw),
            Err(e) => {
                warn!("Page {}: text could not be decoded: {}", page_num, e);
                String::new()
            }
        };
        if text.is_empty() {
            empty_pages.push(position + 1);
        }
        debug!("Page {} → {} chars", position + 1, text.chars().count());
        page_texts.push(text);
    }

    let text = if empty_pages.len() == page_count {
        String::new()
    } else {
        join_pages(&page_texts, separator)
    };

    if text.is_empty() {
        warn!("PDF has {} pages but no extractable text layer", page_count);
    } else {
        info!(
            "Extracted {} chars from {} pages ({} empty)",
            text.chars().count(),
            page_count,
            empty_pages.len()
        );
    }

    Ok(ExtractedText {
        text,
        page_count,
        empty_pages,
    })
}

/// Extract a document on the blocking thread pool.
pub async fn extract_document(
    document: &Document,
    separator: &PageSeparator,
) -> Result<ExtractedText, PipelineError> {
    let bytes = document.raw_bytes.clone();
    let separator = separator.clone();

    tokio::task::spawn_blocking(move || extract_text(&bytes, &separator))
        .await
        .map_err(|e| PipelineError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn join_pages(pages: &[String], separator: &PageSeparator) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(i + 1));
        }
        out.push_str(page);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;
    use lopdf::{Object, Stream};

    /// Build a PDF with one page per entry; an empty entry yields a page
    /// with an empty content stream (like an image-only scan).
    pub(crate) fn make_test_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = if text.is_empty() {
                String::new()
            } else {
                format!("BT /F1 12 Tf 72 700 Td ({text}) Tj ET")
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_text_from_digital_pdf() {
        let pdf = make_test_pdf(&["John Smith was born 01/02/1990 at 123 Main St."]);
        let out = extract_text(&pdf, &PageSeparator::default()).unwrap();
        assert_eq!(out.page_count, 1);
        assert!(out.empty_pages.is_empty());
        assert!(
            out.text.contains("John Smith"),
            "unexpected text: {:?}",
            out.text
        );
    }

    #[test]
    fn pages_are_joined_in_order_with_separator() {
        let pdf = make_test_pdf(&["First page", "Second page"]);
        let out = extract_text(&pdf, &PageSeparator::PageMarker).unwrap();
        let first = out.text.find("First page").unwrap();
        let marker = out.text.find("--- Page 2 ---").unwrap();
        let second = out.text.find("Second page").unwrap();
        assert!(first < marker && marker < second, "got: {:?}", out.text);
    }

    #[test]
    fn image_only_pdf_yields_empty_text() {
        let pdf = make_test_pdf(&["", ""]);
        let out = extract_text(&pdf, &PageSeparator::default()).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.page_count, 2);
        assert_eq!(out.empty_pages, vec![1, 2]);
    }

    #[test]
    fn empty_middle_page_keeps_its_separator() {
        let pdf = make_test_pdf(&["One", "", "Three"]);
        let out = extract_text(&pdf, &PageSeparator::default()).unwrap();
        assert_eq!(out.empty_pages, vec![2]);
        assert_eq!(out.text.matches('\u{000C}').count(), 2);
    }

    #[test]
    fn non_pdf_bytes_are_corrupt() {
        let err = extract_text(b"not a pdf", &PageSeparator::default()).unwrap_err();
        assert_eq!(err.code(), "DocumentCorrupt");
    }

    #[test]
    fn magic_tolerates_leading_whitespace() {
        assert!(has_pdf_magic(b"\r\n  %PDF-1.7"));
        assert!(!has_pdf_magic(b"x%PDF-1.7"));
        assert!(!has_pdf_magic(b""));
    }

    #[test]
    fn truncated_pdf_is_corrupt() {
        let err = extract_text(b"%PDF-1.4\n1 0 obj\n<<", &PageSeparator::default()).unwrap_err();
        assert_eq!(err.code(), "DocumentCorrupt");
    }

    #[test]
    fn validate_rejects_non_pdf_names_and_empty_files() {
        assert!(Document::new("scan.PDF", vec![1]).validate().is_ok());
        let err = Document::new("notes.txt", vec![1]).validate().unwrap_err();
        assert_eq!(err.code(), "ValidationError");
        assert!(Document::new("a.pdf", vec![]).validate().is_err());
    }

    #[tokio::test]
    async fn extract_document_runs_on_blocking_pool() {
        let doc = Document::new("a.pdf", make_test_pdf(&["Hello World"]));
        let out = extract_document(&doc, &PageSeparator::default()).await.unwrap();
        assert!(out.text.contains("Hello"));
    }
}
