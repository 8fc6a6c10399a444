//! Page classification: which background goes behind which page.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::model::{
    Background, BackgroundMode, BackgroundRule, CompanyBackground, PageSelector,
    ReportBackgroundConfig, RuleSource,
};
use super::predicate::Predicate;
use crate::error::{Error, Result};

/// Position of a page within the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageContext {
    /// 1-based page number
    pub page: u32,
    /// Total pages in the document
    pub page_count: u32,
}

impl PageContext {
    pub fn new(page: u32, page_count: u32) -> Result<Self> {
        if page == 0 || page > page_count {
            return Err(Error::PdfInvalidPage {
                page: page as usize,
                total: page_count as usize,
            });
        }
        Ok(Self { page, page_count })
    }

    pub const fn is_first(&self) -> bool {
        self.page == 1
    }

    pub const fn is_last(&self) -> bool {
        self.page == self.page_count
    }
}

/// Resolved outcome of a rule: a background, or deliberately none.
type Slot = Option<Background>;

/// Compiled background rules of one report for one company.
///
/// Pages are classified in this order and the first match wins:
/// first page, last page, fixed page number, expressions in declaration
/// order, remaining pages. A page no rule claims gets no background.
#[derive(Debug, Default)]
pub struct BackgroundPlan {
    first: Option<Slot>,
    last: Option<Slot>,
    fixed: BTreeMap<u32, Slot>,
    expressions: Vec<(Predicate, Slot)>,
    remaining: Option<Slot>,
}

impl BackgroundPlan {
    /// A plan that never assigns a background
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile the report configuration against the rendering company.
    pub fn build(
        config: &ReportBackgroundConfig,
        company: Option<&CompanyBackground>,
    ) -> Result<Self> {
        if !config.enabled {
            debug!("Backgrounds disabled for {}", config.report);
            return Ok(Self::empty());
        }

        match &config.mode {
            BackgroundMode::CompanyDefault => {
                let background = company_background(company)?;
                Ok(Self {
                    remaining: Some(Some(background)),
                    ..Self::default()
                })
            }
            BackgroundMode::ReportRules { rules } => Self::compile(&config.report, rules, company),
            BackgroundMode::CompanyRules => {
                let company = company.ok_or_else(|| {
                    Error::RuleInvalid(format!(
                        "report '{}' uses company rules but no company was given",
                        config.report
                    ))
                })?;
                Self::compile(&config.report, &company.rules, Some(company))
            }
        }
    }

    fn compile(
        report: &str,
        rules: &[BackgroundRule],
        company: Option<&CompanyBackground>,
    ) -> Result<Self> {
        let mut plan = Self::default();

        for rule in rules {
            let slot = match &rule.source {
                RuleSource::Custom { background } => {
                    if background.is_empty() {
                        return Err(Error::RuleInvalid(format!(
                            "{} rule of '{report}' has an empty background",
                            rule.page
                        )));
                    }
                    Some(background.clone())
                }
                RuleSource::Company => Some(company_background(company)?),
                RuleSource::Blank => None,
            };

            let taken = match &rule.page {
                PageSelector::First => set_once(&mut plan.first, slot),
                PageSelector::Last => set_once(&mut plan.last, slot),
                PageSelector::Remaining => set_once(&mut plan.remaining, slot),
                PageSelector::Fixed { page } => {
                    if *page == 0 {
                        return Err(Error::RuleInvalid(format!(
                            "page numbers start at 1 (report '{report}')"
                        )));
                    }
                    if plan.fixed.contains_key(page) {
                        false
                    } else {
                        plan.fixed.insert(*page, slot);
                        true
                    }
                }
                PageSelector::Expression { expr } => {
                    plan.expressions.push((Predicate::parse(expr)?, slot));
                    true
                }
            };

            if !taken {
                warn!(
                    "Ignoring duplicate {} rule of '{}'; the first one wins",
                    rule.page, report
                );
            }
        }

        Ok(plan)
    }

    /// Classify one page.
    pub fn select(&self, ctx: &PageContext) -> Result<Option<&Background>> {
        if ctx.is_first()
            && let Some(slot) = &self.first
        {
            return Ok(slot.as_ref());
        }
        if ctx.is_last()
            && let Some(slot) = &self.last
        {
            return Ok(slot.as_ref());
        }
        if let Some(slot) = self.fixed.get(&ctx.page) {
            return Ok(slot.as_ref());
        }
        for (predicate, slot) in &self.expressions {
            if predicate.eval(ctx)? {
                return Ok(slot.as_ref());
            }
        }
        Ok(self.remaining.as_ref().and_then(Option::as_ref))
    }

    /// True when no page can ever receive a background
    pub fn is_empty(&self) -> bool {
        let has = |slot: &Option<Slot>| matches!(slot, Some(Some(_)));
        !(has(&self.first)
            || has(&self.last)
            || has(&self.remaining)
            || self.fixed.values().any(Option::is_some)
            || self.expressions.iter().any(|(_, slot)| slot.is_some()))
    }
}

fn set_once(target: &mut Option<Slot>, slot: Slot) -> bool {
    if target.is_some() {
        return false;
    }
    *target = Some(slot);
    true
}

fn company_background(company: Option<&CompanyBackground>) -> Result<Background> {
    let company = company.ok_or_else(|| Error::MissingCompanyBackground {
        company: "<none>".to_string(),
    })?;
    company
        .default_background
        .clone()
        .filter(|bg| !bg.is_empty())
        .ok_or_else(|| Error::MissingCompanyBackground {
            company: company.company.clone(),
        })
}
