//! PDF text extraction using pdf_oxide.
//!
//! Pages are converted one at a time and laid out as `\n[Page n] text` so the
//! chunker can recover the page a window starts on.

use anyhow::Result;
use pdf_oxide::converters::ConversionOptions;
use std::path::Path;

/// Extract and lay out the text of every page
pub fn extract_text_from_pdf(pdf_path: &Path) -> Result<String> {
    Ok(layout_pages(&extract_pages(pdf_path)?))
}

/// Text of each page, in order. Pages that fail to convert come back empty.
pub fn extract_pages(pdf_path: &Path) -> Result<Vec<String>> {
    let mut doc = pdf_oxide::PdfDocument::open(pdf_path)
        .map_err(|e| anyhow::anyhow!("Failed to open PDF: {}", e))?;

    let page_count = doc.page_count()
        .map_err(|e| anyhow::anyhow!("Failed to get page count: {}", e))?;

    let options = ConversionOptions::default();
    let mut pages = Vec::new();

    for page_idx in 0..page_count {
        match doc.to_markdown(page_idx, &options) {
            Ok(text) => pages.push(text),
            Err(e) => {
                tracing::warn!(page = page_idx + 1, error = %e, "Failed to extract PDF page");
                pages.push(String::new());
            }
        }
    }

    Ok(pages)
}

/// Join pages as `\n[Page 1] ...\n[Page 2] ...`
pub fn layout_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        text.push_str(&format!("\n[Page {}] {}", i + 1, page.as_ref()));
    }
    text
}
