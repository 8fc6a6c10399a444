use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Raw bytes of a background artifact (a PDF or a PNG/JPEG image).
///
/// Serialized as base64 so stored records stay plain JSON/TOML.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Background(#[serde(with = "base64_bytes")] Vec<u8>);

impl Background {
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode base64 data; embedded line breaks are ignored.
    pub fn from_base64(data: &str) -> Result<Self> {
        base64_bytes::decode(data)
            .map(Self)
            .map_err(|e| Error::BackgroundDecode(format!("invalid base64: {e}")))
    }

    /// Read a background artifact from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::BackgroundDecode(format!(
                "Failed to read background {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        if bytes.is_empty() {
            return Err(Error::BackgroundDecode(format!(
                "{} is empty",
                path.as_ref().display()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MD5 of the bytes, used as the decoded-background cache key
    pub fn content_id(&self) -> String {
        format!("{:x}", md5::compute(&self.0))
    }
}

impl fmt::Debug for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Background")
            .field("len", &self.0.len())
            .field("content_id", &self.content_id())
            .finish()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Which page(s) of a rendered report a rule targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageSelector {
    First,
    Last,
    /// Every page no other rule claimed
    Remaining,
    /// A 1-based page number
    Fixed { page: u32 },
    /// A page predicate, see [`crate::rules::Predicate`]
    Expression { expr: String },
}

impl fmt::Display for PageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first page"),
            Self::Last => write!(f, "last page"),
            Self::Remaining => write!(f, "remaining pages"),
            Self::Fixed { page } => write!(f, "page {page}"),
            Self::Expression { expr } => write!(f, "pages where `{expr}`"),
        }
    }
}

/// Where the background of a rule comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSource {
    /// A background stored on the rule itself
    Custom { background: Background },
    /// The company default background
    Company,
    /// Explicitly no background
    Blank,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { background } => write!(f, "custom ({} bytes)", background.len()),
            Self::Company => write!(f, "company default"),
            Self::Blank => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundRule {
    pub page: PageSelector,
    pub source: RuleSource,
}

impl BackgroundRule {
    pub const fn new(page: PageSelector, source: RuleSource) -> Self {
        Self { page, source }
    }
}

/// Company-level background settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyBackground {
    pub company: String,
    pub default_background: Option<Background>,
    #[serde(default)]
    pub rules: Vec<BackgroundRule>,
}

impl CompanyBackground {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            default_background: None,
            rules: Vec::new(),
        }
    }
}

/// How a report picks its backgrounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundMode {
    /// The company default background behind every page
    CompanyDefault,
    /// Rules stored on the report
    ReportRules { rules: Vec<BackgroundRule> },
    /// The rules of the rendering company
    CompanyRules,
}

/// Per-report background configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBackgroundConfig {
    pub report: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub mode: BackgroundMode,
}

const fn default_true() -> bool {
    true
}

impl ReportBackgroundConfig {
    pub fn new(report: impl Into<String>, mode: BackgroundMode) -> Self {
        Self {
            report: report.into(),
            enabled: true,
            mode,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_ignores_line_breaks() {
        let bg = Background::from_base64("JVBE\nRi0x\r\nLjQ=").unwrap();
        assert_eq!(bg.bytes(), b"%PDF-1.4");
        assert_eq!(bg.to_base64(), "JVBERi0xLjQ=");
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            Background::from_base64("not base64!"),
            Err(Error::BackgroundDecode(_))
        ));
    }

    #[test]
    fn test_report_config_json_shape() {
        let config = ReportBackgroundConfig::new(
            "account.report_invoice",
            BackgroundMode::ReportRules {
                rules: vec![
                    BackgroundRule::new(
                        PageSelector::First,
                        RuleSource::Custom {
                            background: Background::new(b"%PDF-1.4".to_vec()),
                        },
                    ),
                    BackgroundRule::new(PageSelector::Fixed { page: 3 }, RuleSource::Blank),
                ],
            },
        );

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["mode"]["type"], "report_rules");
        assert_eq!(json["mode"]["rules"][0]["page"]["type"], "first");
        assert_eq!(json["mode"]["rules"][0]["source"]["background"], "JVBERi0xLjQ=");
        assert_eq!(json["mode"]["rules"][1]["page"]["page"], 3);

        let back: ReportBackgroundConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let config: ReportBackgroundConfig = serde_json::from_str(
            r#"{"report": "sale.report_saleorder", "mode": {"type": "company_default"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.mode, BackgroundMode::CompanyDefault);
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(PageSelector::Fixed { page: 2 }.to_string(), "page 2");
        assert_eq!(
            PageSelector::Expression { expr: "page > 1".to_string() }.to_string(),
            "pages where `page > 1`"
        );
    }
}
