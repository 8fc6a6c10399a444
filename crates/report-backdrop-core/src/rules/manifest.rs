//! TOML manifest for importing background rules.
//!
//! ```toml
//! [[company]]
//! id = "main"
//! background = "letterhead.pdf"
//!
//! [[report]]
//! report = "account.report_invoice"
//! mode = "report_rules"
//!
//! [[report.rules]]
//! page = "first"
//! background = "invoice-first.pdf"
//!
//! [[report.rules]]
//! expression = "page % 2 == 0"
//! company = true
//!
//! [[report.rules]]
//! page = "last"          # no background: the last page stays blank
//! ```
//!
//! Background paths are relative to the manifest file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::model::{
    Background, BackgroundMode, BackgroundRule, CompanyBackground, PageSelector,
    ReportBackgroundConfig, RuleSource,
};
use super::predicate::Predicate;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PageEntry {
    Number(u32),
    Named(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    page: Option<PageEntry>,
    expression: Option<String>,
    background: Option<PathBuf>,
    #[serde(default)]
    company: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompanyEntry {
    id: String,
    background: Option<PathBuf>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeEntry {
    CompanyDefault,
    ReportRules,
    CompanyRules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportEntry {
    report: String,
    #[serde(default = "default_true")]
    enabled: bool,
    mode: Option<ModeEntry>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

const fn default_true() -> bool {
    true
}

/// Parsed, not yet resolved, rule manifest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleManifest {
    #[serde(default, rename = "company")]
    companies: Vec<CompanyEntry>,
    #[serde(default, rename = "report")]
    reports: Vec<ReportEntry>,
}

/// Records ready to be written to the rule store
#[derive(Debug, Clone, Default)]
pub struct ResolvedManifest {
    pub companies: Vec<CompanyBackground>,
    pub reports: Vec<ReportBackgroundConfig>,
}

impl RuleManifest {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse rule manifest: {e}")))
    }

    /// Read and resolve a manifest; backgrounds are read relative to its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<ResolvedManifest> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigLoad(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&content)?.resolve(base_dir)
    }

    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedManifest> {
        let read = |file: &PathBuf| Background::from_file(base_dir.join(file));

        let companies = self
            .companies
            .iter()
            .map(|entry| {
                Ok(CompanyBackground {
                    company: entry.id.clone(),
                    default_background: entry.background.as_ref().map(read).transpose()?,
                    rules: resolve_rules(&entry.rules, base_dir)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let reports = self
            .reports
            .iter()
            .map(|entry| {
                let mode = entry.mode.unwrap_or(if entry.rules.is_empty() {
                    ModeEntry::CompanyDefault
                } else {
                    ModeEntry::ReportRules
                });
                let mode = match mode {
                    ModeEntry::CompanyDefault => BackgroundMode::CompanyDefault,
                    ModeEntry::CompanyRules => BackgroundMode::CompanyRules,
                    ModeEntry::ReportRules => BackgroundMode::ReportRules {
                        rules: resolve_rules(&entry.rules, base_dir)?,
                    },
                };
                if !matches!(mode, BackgroundMode::ReportRules { .. }) && !entry.rules.is_empty() {
                    return Err(Error::RuleInvalid(format!(
                        "report '{}' lists rules but its mode ignores them",
                        entry.report
                    )));
                }
                Ok(ReportBackgroundConfig {
                    report: entry.report.clone(),
                    enabled: entry.enabled,
                    mode,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedManifest { companies, reports })
    }
}

fn resolve_rules(entries: &[RuleEntry], base_dir: &Path) -> Result<Vec<BackgroundRule>> {
    entries
        .iter()
        .map(|entry| {
            let page = match (&entry.page, &entry.expression) {
                (Some(page), None) => parse_page(page)?,
                (None, Some(expr)) => {
                    Predicate::parse(expr)?;
                    PageSelector::Expression { expr: expr.clone() }
                }
                _ => {
                    return Err(Error::RuleInvalid(
                        "each rule needs exactly one of 'page' or 'expression'".to_string(),
                    ));
                }
            };
            let source = match (&entry.background, entry.company) {
                (Some(file), false) => RuleSource::Custom {
                    background: Background::from_file(base_dir.join(file))?,
                },
                (None, true) => RuleSource::Company,
                (None, false) => RuleSource::Blank,
                (Some(_), true) => {
                    return Err(Error::RuleInvalid(format!(
                        "{page} rule cannot have both a background file and company = true"
                    )));
                }
            };
            Ok(BackgroundRule::new(page, source))
        })
        .collect()
}

fn parse_page(entry: &PageEntry) -> Result<PageSelector> {
    let selector = match entry {
        PageEntry::Number(page) => PageSelector::Fixed { page: *page },
        PageEntry::Named(name) => match name.trim().to_lowercase().as_str() {
            "first" => PageSelector::First,
            "last" => PageSelector::Last,
            "remaining" | "rest" | "others" => PageSelector::Remaining,
            other => other
                .parse::<u32>()
                .map(|page| PageSelector::Fixed { page })
                .map_err(|_| Error::RuleInvalid(format!("unknown page selector '{name}'")))?,
        },
    };
    if matches!(selector, PageSelector::Fixed { page: 0 }) {
        return Err(Error::RuleInvalid("page numbers start at 1".to_string()));
    }
    Ok(selector)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) {
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn test_resolve_full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "letterhead.pdf", b"%PDF-letterhead");
        write(dir.path(), "first.pdf", b"%PDF-first");

        let manifest = RuleManifest::from_toml(
            r#"
            [[company]]
            id = "main"
            background = "letterhead.pdf"

            [[report]]
            report = "account.report_invoice"

            [[report.rules]]
            page = "first"
            background = "first.pdf"

            [[report.rules]]
            page = 4

            [[report.rules]]
            expression = "page % 2 == 0"
            company = true

            [[report]]
            report = "sale.report_saleorder"
            enabled = false
            "#,
        )
        .unwrap();

        let resolved = manifest.resolve(dir.path()).unwrap();
        assert_eq!(resolved.companies.len(), 1);
        assert_eq!(
            resolved.companies[0].default_background.as_ref().unwrap().bytes(),
            b"%PDF-letterhead"
        );

        let invoice = &resolved.reports[0];
        let BackgroundMode::ReportRules { rules } = &invoice.mode else {
            panic!("expected report rules");
        };
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].page, PageSelector::First);
        assert!(matches!(&rules[0].source, RuleSource::Custom { background } if background.bytes() == b"%PDF-first"));
        assert_eq!(rules[1].page, PageSelector::Fixed { page: 4 });
        assert_eq!(rules[1].source, RuleSource::Blank);
        assert_eq!(rules[2].source, RuleSource::Company);

        let sale = &resolved.reports[1];
        assert!(!sale.enabled);
        assert_eq!(sale.mode, BackgroundMode::CompanyDefault);
    }

    #[test]
    fn test_rule_needs_one_selector() {
        let manifest = RuleManifest::from_toml(
            r#"
            [[report]]
            report = "r"
            [[report.rules]]
            page = "first"
            expression = "page == 1"
            "#,
        )
        .unwrap();
        assert!(matches!(
            manifest.resolve(Path::new(".")),
            Err(Error::RuleInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_selector_and_missing_file() {
        let manifest = RuleManifest::from_toml(
            "[[report]]\nreport = \"r\"\n[[report.rules]]\npage = \"middle\"\n",
        )
        .unwrap();
        assert!(manifest.resolve(Path::new(".")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let manifest = RuleManifest::from_toml(
            "[[company]]\nid = \"main\"\nbackground = \"missing.pdf\"\n",
        )
        .unwrap();
        assert!(matches!(
            manifest.resolve(dir.path()),
            Err(Error::BackgroundDecode(_))
        ));
    }

    #[test]
    fn test_malformed_expression_rejected_on_import() {
        let manifest = RuleManifest::from_toml(
            "[[report]]\nreport = \"r\"\n[[report.rules]]\nexpression = \"page ==\"\n",
        )
        .unwrap();
        match manifest.resolve(Path::new(".")) {
            Err(Error::RuleExpression { expr, .. }) => assert_eq!(expr, "page =="),
            other => panic!("unexpected result: {other:?}"),
        }

        let manifest = RuleManifest::from_toml(
            "[[company]]\nid = \"main\"\n[[company.rules]]\nexpression = \"record.id\"\n",
        )
        .unwrap();
        assert!(matches!(
            manifest.resolve(Path::new(".")),
            Err(Error::RuleExpression { .. })
        ));
    }

    #[test]
    fn test_page_zero_rejected() {
        for page in ["page = 0", "page = \"0\""] {
            let manifest = RuleManifest::from_toml(&format!(
                "[[report]]\nreport = \"r\"\n[[report.rules]]\n{page}\n"
            ))
            .unwrap();
            assert!(matches!(
                manifest.resolve(Path::new(".")),
                Err(Error::RuleInvalid(_))
            ));
        }
    }

    #[test]
    fn test_rules_with_company_mode_rejected() {
        let manifest = RuleManifest::from_toml(
            "[[report]]\nreport = \"r\"\nmode = \"company_rules\"\n[[report.rules]]\npage = \"last\"\n",
        )
        .unwrap();
        assert!(matches!(
            manifest.resolve(Path::new(".")),
            Err(Error::RuleInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(RuleManifest::from_toml("[[report]]\nreport = \"r\"\ncolour = \"red\"\n").is_err());
    }

    #[test]
    fn test_load_reads_relative_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bg.pdf", b"%PDF-bg");
        write(
            dir.path(),
            "rules.toml",
            b"[[company]]\nid = \"main\"\nbackground = \"bg.pdf\"\n",
        );
        let resolved = RuleManifest::load(dir.path().join("rules.toml")).unwrap();
        assert_eq!(resolved.companies[0].company, "main");
    }
}
