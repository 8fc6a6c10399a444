//! Report Backdrop Core Library
//!
//! Renders HTML reports to PDF and places background pages (letterheads,
//! watermarks) beneath selected pages:
//! - HTML rendering through the wkhtmltopdf command line tool
//! - Per-report and per-company background rules, persisted in sled
//! - Page classification (first, last, fixed, scripted, remaining)
//! - Background compositing with lopdf

pub mod cache;
pub mod config;
pub mod error;
pub mod pdf;
pub mod render;
pub mod rules;
pub mod store;
pub mod util;

pub use cache::BackgroundCache;
pub use config::{AppConfig, BackgroundFit, CacheConfig, RendererConfig, StoreConfig};
pub use error::{Error, Result};
pub use pdf::{BackgroundPage, Composer, PageAssignment, PageNumber, PdfDocument};
pub use render::{
    HtmlRenderer, PaperFormat, PaperOverrides, RenderInput, RendererInfo, RendererStatus,
    Wkhtmltopdf, create_renderer,
};
pub use rules::{
    Background, BackgroundMode, BackgroundPlan, BackgroundRule, CompanyBackground, PageContext,
    PageSelector, Predicate, ReportBackgroundConfig, RuleManifest, RuleSource,
};
pub use store::RuleStore;

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-page progress callback: `(pages_done, total_pages)`
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send>;

/// A report to render for a company
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Report name the background rules are stored under
    pub report: String,
    /// Company whose letterhead and rules apply
    pub company: Option<String>,
    pub input: RenderInput,
}

/// High-level report renderer that combines all components
pub struct ReportBackdrop {
    renderer: Arc<dyn HtmlRenderer>,
    store: RuleStore,
    cache: BackgroundCache,
    composer: Composer,
    config: AppConfig,
}

impl ReportBackdrop {
    /// Create from configuration, opening the rule store on disk
    pub fn new(config: AppConfig) -> Result<Self> {
        let renderer = create_renderer(&config);
        let store = if config.store.enabled {
            RuleStore::open(config.store_path())?
        } else {
            RuleStore::temporary()?
        };
        Ok(Self::with_renderer(renderer, store, config))
    }

    /// Create with a custom renderer and store
    pub fn with_renderer(
        renderer: Arc<dyn HtmlRenderer>,
        store: RuleStore,
        config: AppConfig,
    ) -> Self {
        Self {
            renderer,
            store,
            cache: BackgroundCache::new(&config.cache),
            composer: Composer::new(config.fit),
            config,
        }
    }

    /// Render a report and apply its backgrounds
    pub async fn render_report(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        info!(
            "Rendering {} with {}",
            request.report,
            self.renderer.name()
        );
        let pdf = self.renderer.render(&request.input).await?;
        self.apply_backgrounds(pdf, &request.report, request.company.as_deref(), None)
            .await
    }

    /// Place the report's backgrounds beneath an already rendered PDF.
    ///
    /// Returns the input unchanged when the report has no background
    /// configuration, the configuration is disabled, or no page matches.
    pub async fn apply_backgrounds(
        &self,
        pdf: Vec<u8>,
        report: &str,
        company: Option<&str>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<u8>> {
        let doc = PdfDocument::from_bytes(pdf)?;
        let assignments = self
            .assignments(&doc, report, company, progress_callback)
            .await?;

        if assignments.is_empty() {
            debug!("No backgrounds for {}", report);
            return Ok(doc.into_bytes());
        }

        info!(
            "Placing backgrounds under {} of {} page(s) of {}",
            assignments.len(),
            doc.page_count(),
            report
        );
        self.composer.compose(doc.bytes(), &assignments)
    }

    /// Classify every page of `doc` and decode the backgrounds it needs.
    pub async fn assignments(
        &self,
        doc: &PdfDocument,
        report: &str,
        company: Option<&str>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<PageAssignment>> {
        let Some(config) = self.store.report(report)? else {
            debug!("No background configuration for {}", report);
            return Ok(Vec::new());
        };
        if !config.enabled {
            debug!("Backgrounds disabled for {}", report);
            return Ok(Vec::new());
        }

        let company_record = match company {
            Some(id) => {
                let record = self.store.company(id)?;
                if record.is_none() {
                    warn!("Company '{}' has no background record", id);
                }
                record
            }
            None => None,
        };

        let plan = BackgroundPlan::build(&config, company_record.as_ref())?;
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let total_pages = doc.page_count();
        let page_count = u32::try_from(total_pages).map_err(|_| Error::PdfInvalidPage {
            page: total_pages,
            total: total_pages,
        })?;

        let mut assignments = Vec::new();
        for index in 0..total_pages {
            let page = PageNumber::from_index(index, total_pages)?;
            let ctx = PageContext::new(page.get(), page_count)?;

            if let Some(background) = plan.select(&ctx)? {
                let background = self.cache.get_or_decode(background).await?;
                assignments.push(PageAssignment { page, background });
            }

            if let Some(ref callback) = progress_callback {
                callback(index + 1, total_pages);
            }
        }

        Ok(assignments)
    }

    /// Probe the renderer installation
    pub async fn renderer_status(&self) -> RendererStatus {
        self.renderer.status().await
    }

    pub fn renderer_info(&self) -> RendererInfo {
        self.renderer.info()
    }

    pub const fn store(&self) -> &RuleStore {
        &self.store
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }
}
