mod manifest;
mod model;
mod plan;
mod predicate;

pub use manifest::{ResolvedManifest, RuleManifest};
pub use model::{
    Background, BackgroundMode, BackgroundRule, CompanyBackground, PageSelector,
    ReportBackgroundConfig, RuleSource,
};
pub use plan::{BackgroundPlan, PageContext};
pub use predicate::Predicate;
