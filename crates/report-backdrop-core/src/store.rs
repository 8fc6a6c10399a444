//! Persistent background rules, one sled tree per record kind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rules::{CompanyBackground, ReportBackgroundConfig};

const REPORTS_TREE: &str = "reports";
const COMPANIES_TREE: &str = "companies";

/// Rule store backed by sled
pub struct RuleStore {
    db: Db,
    reports: Tree,
    companies: Tree,
}

impl RuleStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreInit(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = sled::open(path).map_err(|e| {
            let err_str = e.to_string();
            // Detect lock errors and provide actionable fix
            if err_str.contains("WouldBlock") || err_str.contains("lock") {
                Error::StoreInit(format!(
                    "Rule store locked at {}\n\n\
                    Another process is using the store, or a previous instance crashed.\n\
                    To fix: rm {}/db/LOCK",
                    path.display(),
                    path.display()
                ))
            } else {
                Error::StoreInit(format!("Failed to open store at {}: {}", path.display(), e))
            }
        })?;

        debug!("Opened rule store at {}", path.display());
        Self::from_db(db)
    }

    /// A store that lives only as long as this value
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| Error::StoreInit(format!("Failed to open temporary store: {e}")))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| Error::StoreInit(format!("Failed to open tree '{name}': {e}")))
        };
        let reports = open_tree(REPORTS_TREE)?;
        let companies = open_tree(COMPANIES_TREE)?;
        Ok(Self {
            db,
            reports,
            companies,
        })
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub fn put_report(&self, config: &ReportBackgroundConfig) -> Result<()> {
        self.put(&self.reports, &config.report, config)
    }

    pub fn report(&self, report: &str) -> Result<Option<ReportBackgroundConfig>> {
        self.get(&self.reports, report)
    }

    /// Returns whether a record was removed
    pub fn remove_report(&self, report: &str) -> Result<bool> {
        self.remove(&self.reports, report)
    }

    pub fn reports(&self) -> Result<Vec<ReportBackgroundConfig>> {
        self.all(&self.reports)
    }

    // =========================================================================
    // Companies
    // =========================================================================

    pub fn put_company(&self, company: &CompanyBackground) -> Result<()> {
        self.put(&self.companies, &company.company, company)
    }

    pub fn company(&self, company: &str) -> Result<Option<CompanyBackground>> {
        self.get(&self.companies, company)
    }

    /// Returns whether a record was removed
    pub fn remove_company(&self, company: &str) -> Result<bool> {
        self.remove(&self.companies, company)
    }

    pub fn companies(&self) -> Result<Vec<CompanyBackground>> {
        self.all(&self.companies)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn put<T: Serialize>(&self, tree: &Tree, key: &str, value: &T) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::StoreWrite("record key must not be empty".to_string()));
        }
        let bytes = serde_json::to_vec(value).map_err(|e| Error::StoreWrite(e.to_string()))?;
        tree.insert(key.as_bytes(), bytes)
            .map_err(|e| Error::StoreWrite(e.to_string()))?;

        // Flush to ensure persistence
        self.db
            .flush()
            .map_err(|e| Error::StoreWrite(format!("Flush failed: {e}")))?;

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, tree: &Tree, key: &str) -> Result<Option<T>> {
        let Some(bytes) = tree
            .get(key.as_bytes())
            .map_err(|e| Error::StoreRead(e.to_string()))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::StoreRead(format!("Corrupt record '{key}': {e}")))
    }

    fn remove(&self, tree: &Tree, key: &str) -> Result<bool> {
        let removed = tree
            .remove(key.as_bytes())
            .map_err(|e| Error::StoreWrite(e.to_string()))?
            .is_some();
        self.db
            .flush()
            .map_err(|e| Error::StoreWrite(format!("Flush failed: {e}")))?;
        Ok(removed)
    }

    fn all<T: DeserializeOwned>(&self, tree: &Tree) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry.map_err(|e| Error::StoreRead(e.to_string()))?;
            match serde_json::from_slice(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping corrupt record '{}': {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rules::{Background, BackgroundMode, BackgroundRule, PageSelector, RuleSource};

    fn invoice_config() -> ReportBackgroundConfig {
        ReportBackgroundConfig::new(
            "account.report_invoice",
            BackgroundMode::ReportRules {
                rules: vec![BackgroundRule::new(
                    PageSelector::Expression { expr: "page > 1".to_string() },
                    RuleSource::Custom {
                        background: Background::new(b"%PDF-1.4 bg".to_vec()),
                    },
                )],
            },
        )
    }

    #[test]
    fn test_report_crud() {
        let store = RuleStore::temporary().unwrap();
        assert!(store.report("account.report_invoice").unwrap().is_none());

        let config = invoice_config();
        store.put_report(&config).unwrap();
        assert_eq!(store.report("account.report_invoice").unwrap(), Some(config.clone()));
        assert_eq!(store.reports().unwrap(), vec![config]);

        assert!(store.remove_report("account.report_invoice").unwrap());
        assert!(!store.remove_report("account.report_invoice").unwrap());
        assert!(store.reports().unwrap().is_empty());
    }

    #[test]
    fn test_company_crud_and_overwrite() {
        let store = RuleStore::temporary().unwrap();
        let mut company = CompanyBackground::new("main");
        store.put_company(&company).unwrap();

        company.default_background = Some(Background::new(b"%PDF-1.4".to_vec()));
        store.put_company(&company).unwrap();

        let stored = store.company("main").unwrap().unwrap();
        assert_eq!(stored, company);
        assert_eq!(store.companies().unwrap().len(), 1);
        assert!(store.remove_company("main").unwrap());
    }

    #[test]
    fn test_trees_are_separate() {
        let store = RuleStore::temporary().unwrap();
        store.put_company(&CompanyBackground::new("shared")).unwrap();
        assert!(store.report("shared").unwrap().is_none());
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = RuleStore::temporary().unwrap();
        assert!(matches!(
            store.put_company(&CompanyBackground::new(" ")),
            Err(Error::StoreWrite(_))
        ));
    }
}
