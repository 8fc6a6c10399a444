use lopdf::Document;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::util::looks_like_pdf;

/// Thread-safe wrapper around rendered report bytes
pub struct PdfDocument {
    /// The raw PDF bytes
    bytes: Arc<Vec<u8>>,
    /// Number of pages
    page_count: usize,
    /// Content-based ID (MD5 hex), computed once on load
    content_id: String,
}

impl PdfDocument {
    /// Open a PDF from bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();

        if !looks_like_pdf(&bytes) {
            return Err(Error::PdfOpen("Input is not a PDF file".to_string()));
        }

        let doc = Document::load_mem(&bytes)
            .map_err(|e| Error::PdfOpen(format!("Failed to parse PDF: {e}")))?;
        let page_count = doc.get_pages().len();

        let content_id = format!("{:x}", md5::compute(&bytes));

        Ok(Self {
            bytes: Arc::new(bytes),
            page_count,
            content_id,
        })
    }

    /// Open a PDF from a file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::PdfOpen(format!("Failed to read file {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_bytes(bytes)
    }

    /// Get number of pages
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Get raw PDF bytes as a slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the bytes back out, copying only if the document was cloned.
    pub fn into_bytes(self) -> Vec<u8> {
        Arc::try_unwrap(self.bytes).unwrap_or_else(|shared| (*shared).clone())
    }

    /// MD5 hash of the PDF bytes.
    pub fn content_id(&self) -> &str {
        &self.content_id
    }
}

impl Clone for PdfDocument {
    /// O(1): only the `Arc` around the bytes is cloned.
    fn clone(&self) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            page_count: self.page_count,
            content_id: self.content_id.clone(),
        }
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.page_count)
            .field("content_id", &self.content_id)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::sample_pdf;

    #[test]
    fn test_from_bytes_counts_pages() {
        let bytes = sample_pdf(3, [0.0, 0.0, 595.0, 842.0]);
        let doc = PdfDocument::from_bytes(bytes.clone()).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.content_id(), format!("{:x}", md5::compute(&bytes)));
        assert_eq!(doc.clone().into_bytes(), bytes);
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            PdfDocument::from_bytes(b"<html></html>".to_vec()),
            Err(Error::PdfOpen(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PdfDocument::from_file("/definitely/not/here.pdf"),
            Err(Error::PdfOpen(_))
        ));
    }
}
