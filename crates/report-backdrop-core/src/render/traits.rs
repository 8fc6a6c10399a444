use async_trait::async_trait;
use std::fmt;

use super::paper::{PaperFormat, PaperOverrides};
use crate::error::Result;

/// Information about a renderer backend
#[derive(Debug, Clone)]
pub struct RendererInfo {
    /// Human-readable name
    pub name: &'static str,
}

/// Installation state of the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererStatus {
    /// Usable, with the detected version
    Ok(String),
    /// Binary not found
    Install,
    /// Version too old (below 0.12.0)
    Upgrade(String),
    /// Binary present but the version check failed
    Broken(String),
}

impl RendererStatus {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl fmt::Display for RendererStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(v) => write!(f, "ok ({v})"),
            Self::Install => write!(f, "not installed"),
            Self::Upgrade(v) => write!(f, "upgrade required (found {v}, need 0.12.0 or later)"),
            Self::Broken(reason) => write!(f, "broken: {reason}"),
        }
    }
}

/// Everything the renderer needs to turn HTML into a PDF.
#[derive(Debug, Clone, Default)]
pub struct RenderInput {
    /// HTML bodies of the report, rendered in order
    pub bodies: Vec<String>,
    /// HTML header repeated on every page
    pub header: Option<String>,
    /// HTML footer repeated on every page
    pub footer: Option<String>,
    /// Force landscape output
    pub landscape: bool,
    /// Paper format; the configured default is used when unset
    pub paper: Option<PaperFormat>,
    /// Report-specific values that win over the paper format
    pub overrides: PaperOverrides,
    /// Use a 1280x1024 (or 1024x1280) viewport
    pub set_viewport_size: bool,
}

impl RenderInput {
    pub fn from_bodies(bodies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            bodies: bodies.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Trait for HTML-to-PDF backends
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Get information about this renderer
    fn info(&self) -> RendererInfo;

    /// Get the renderer name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Render the input into a single PDF buffer
    async fn render(&self, input: &RenderInput) -> Result<Vec<u8>>;

    /// Check whether the renderer can be used
    async fn status(&self) -> RendererStatus {
        RendererStatus::Ok("builtin".to_string())
    }
}
