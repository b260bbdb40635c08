//! Page-granular PDF text extraction.

use std::path::Path;

use crate::core::errors::ApiError;

/// One page worth of extracted text. `page` is the 1-based page number
/// when the document structure provides one.
#[derive(Debug, Clone)]
pub struct PageSection {
    pub text: String,
    pub page: Option<u32>,
}

/// Load a PDF as a sequence of page-level sections.
///
/// A document that cannot be parsed at all is a fatal pipeline error.
/// Pages whose text cannot be extracted are skipped with a warning;
/// if every page is skipped the caller sees an empty section list and
/// treats that as "no content found".
pub fn load_pdf(path: &Path) -> Result<Vec<PageSection>, ApiError> {
    let doc = lopdf::Document::load(path).map_err(|e| {
        ApiError::Pipeline(format!("failed to load PDF {}: {}", path.display(), e))
    })?;

    let mut sections = Vec::new();
    for (page_number, _object_id) in doc.get_pages() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                sections.push(PageSection {
                    text,
                    page: Some(page_number),
                });
            }
            Err(e) => {
                tracing::warn!(
                    "skipping page {} of {}: text extraction failed: {}",
                    page_number,
                    path.display(),
                    e
                );
            }
        }
    }

    Ok(sections)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_sections_with_page_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two-pages.pdf");
        test_pdf::write_pdf(&path, &["first page text", "second page text"]);

        let sections = load_pdf(&path).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].page, Some(1));
        assert_eq!(sections[1].page, Some(2));
        assert!(sections[0].text.contains("first page text"));
        assert!(sections[1].text.contains("second page text"));
    }

    #[test]
    fn unreadable_file_is_a_pipeline_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-pdf.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = load_pdf(&path).unwrap_err();
        assert!(matches!(err, ApiError::Pipeline(_)));
    }

    #[test]
    fn missing_file_is_a_pipeline_error() {
        let err = load_pdf(Path::new("/nonexistent/nope.pdf")).unwrap_err();
        assert!(matches!(err, ApiError::Pipeline(_)));
    }
}
