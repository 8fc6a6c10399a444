use thiserror::Error;

/// Unified error type for report-backdrop-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - PDF operations (opening, compositing, saving)
/// - Background decoding
/// - Renderer subprocess (discovery, exit codes, output)
/// - Background rules and page predicates
/// - Rule store and configuration
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // PDF Errors
    // ==========================================================================
    /// Failed to open or parse a PDF file
    #[error("failed to open PDF: {0}")]
    PdfOpen(String),

    /// Invalid page number requested
    #[error("invalid page number {page} (document has {total} pages)")]
    PdfInvalidPage { page: usize, total: usize },

    /// Failed to composite a background under a page
    #[error("failed to compose page {page}: {reason}")]
    PdfCompose { page: u32, reason: String },

    /// Failed to save a PDF
    #[error("failed to save PDF: {0}")]
    PdfSave(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    // ==========================================================================
    // Background Errors
    // ==========================================================================
    /// Background bytes are neither a PDF nor a supported image
    #[error("failed to decode background: {0}")]
    BackgroundDecode(String),

    /// A rule falls back to the company image but the company has none
    #[error("company '{company}' has no default background image")]
    MissingCompanyBackground { company: String },

    // ==========================================================================
    // Renderer Errors
    // ==========================================================================
    /// Renderer binary could not be located
    #[error("renderer binary not found: {0}")]
    RendererNotFound(String),

    /// Renderer exited with a fatal status
    #[error("wkhtmltopdf failed (error code: {}). Message: {message}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    RendererFailed { code: Option<i32>, message: String },

    /// Renderer did not finish in time
    #[error("renderer timed out after {0} seconds")]
    RendererTimeout(u64),

    /// Renderer finished but produced unusable output
    #[error("renderer produced no usable output: {0}")]
    RendererOutput(String),

    // ==========================================================================
    // Rule Errors
    // ==========================================================================
    /// A background rule is malformed
    #[error("invalid background rule: {0}")]
    RuleInvalid(String),

    /// A page predicate failed to parse or evaluate
    #[error("page expression '{expr}': {reason}")]
    RuleExpression { expr: String, reason: String },

    // ==========================================================================
    // Store Errors
    // ==========================================================================
    /// Failed to open the rule store
    #[error("failed to initialize rule store: {0}")]
    StoreInit(String),

    /// Failed to read from the rule store
    #[error("failed to read from rule store: {0}")]
    StoreRead(String),

    /// Failed to write to the rule store
    #[error("failed to write to rule store: {0}")]
    StoreWrite(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_failed_message() {
        let err = Error::RendererFailed {
            code: Some(2),
            message: "Exit with code 2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "wkhtmltopdf failed (error code: 2). Message: Exit with code 2"
        );

        let err = Error::RendererFailed {
            code: None,
            message: String::new(),
        };
        assert!(err.to_string().contains("error code: signal"));
    }
}
