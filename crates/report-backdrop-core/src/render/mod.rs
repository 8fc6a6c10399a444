mod paper;
mod traits;
mod wkhtmltopdf;

pub use paper::{CUSTOM_FORMAT, Orientation, PaperFormat, PaperOverrides, build_args};
pub use traits::{HtmlRenderer, RenderInput, RendererInfo, RendererStatus};
pub use wkhtmltopdf::{Wkhtmltopdf, check_exit, extract_version};

use crate::config::AppConfig;
use std::sync::Arc;

/// Create a renderer from configuration
pub fn create_renderer(config: &AppConfig) -> Arc<dyn HtmlRenderer> {
    Arc::new(Wkhtmltopdf::new(&config.renderer, config.paper.clone()))
}
