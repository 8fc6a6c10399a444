//! Paper format and the renderer command line derived from it.
//!
//! All lengths are millimetres, which is what wkhtmltopdf assumes for
//! unit-less margin values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Named format meaning "use `page_width`/`page_height`".
pub const CUSTOM_FORMAT: &str = "custom";

/// Page orientation as understood by `--orientation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portrait => write!(f, "Portrait"),
            Self::Landscape => write!(f, "Landscape"),
        }
    }
}

/// Paper format of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperFormat {
    /// Named page size (A4, Letter, ...) or `custom`
    pub format: String,
    /// Page width for the custom format
    pub page_width: Option<f32>,
    /// Page height for the custom format
    pub page_height: Option<f32>,
    pub orientation: Option<Orientation>,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    /// Space between header and content (0 = renderer default)
    pub header_spacing: f32,
    /// Output DPI (0 = renderer default)
    pub dpi: u32,
    pub header_line: bool,
    pub disable_shrinking: bool,
}

impl Default for PaperFormat {
    fn default() -> Self {
        Self {
            format: "A4".to_string(),
            page_width: None,
            page_height: None,
            orientation: Some(Orientation::Portrait),
            margin_top: 40.0,
            margin_bottom: 32.0,
            margin_left: 7.0,
            margin_right: 7.0,
            header_spacing: 35.0,
            dpi: 90,
            header_line: false,
            disable_shrinking: false,
        }
    }
}

impl PaperFormat {
    pub fn is_custom(&self) -> bool {
        self.format.eq_ignore_ascii_case(CUSTOM_FORMAT)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.format.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "paper.format".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.is_custom() {
            match (self.page_width, self.page_height) {
                (Some(w), Some(h)) if w > 0.0 && h > 0.0 => {}
                _ => {
                    return Err(Error::ConfigInvalid {
                        field: "paper.page_width/page_height".to_string(),
                        reason: "custom format needs a positive width and height".to_string(),
                    });
                }
            }
        }
        let margins = [
            ("paper.margin_top", self.margin_top),
            ("paper.margin_bottom", self.margin_bottom),
            ("paper.margin_left", self.margin_left),
            ("paper.margin_right", self.margin_right),
        ];
        for (field, value) in margins {
            if value < 0.0 {
                return Err(Error::ConfigInvalid {
                    field: field.to_string(),
                    reason: format!("negative margin {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Per-report values that take precedence over the paper format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperOverrides {
    pub margin_top: Option<f32>,
    pub header_spacing: Option<f32>,
    pub dpi: Option<u32>,
    pub landscape: Option<bool>,
}

/// Format a length the way the renderer expects it (`40`, `7.5`).
fn num(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Windows builds of wkhtmltopdf render tiny text below 96 dpi.
const fn effective_dpi(dpi: u32) -> u32 {
    if cfg!(windows) && dpi <= 95 { 96 } else { dpi }
}

/// Build the renderer arguments for a paper format.
///
/// Header/footer files, input bodies and the output path are appended by
/// the caller.
pub fn build_args(
    paper: &PaperFormat,
    landscape: bool,
    overrides: &PaperOverrides,
    set_viewport_size: bool,
    quiet: bool,
) -> Vec<String> {
    let landscape = overrides.landscape.unwrap_or(landscape);
    let mut args: Vec<String> = Vec::new();

    if set_viewport_size {
        let size = if landscape { "1024x1280" } else { "1280x1024" };
        args.extend(["--viewport-size".to_string(), size.to_string()]);
    }

    if quiet {
        args.push("--quiet".to_string());
    }

    if paper.is_custom() {
        if let (Some(w), Some(h)) = (paper.page_width, paper.page_height) {
            args.extend([
                "--page-width".to_string(),
                format!("{}mm", num(w)),
                "--page-height".to_string(),
                format!("{}mm", num(h)),
            ]);
        }
    } else if !paper.format.is_empty() {
        args.extend(["--page-size".to_string(), paper.format.clone()]);
    }

    let margin_top = overrides.margin_top.unwrap_or(paper.margin_top);
    args.extend(["--margin-top".to_string(), num(margin_top)]);

    let dpi = overrides
        .dpi
        .unwrap_or_else(|| if paper.dpi > 0 { effective_dpi(paper.dpi) } else { 0 });
    if dpi > 0 {
        args.extend(["--dpi".to_string(), dpi.to_string()]);
    }

    if let Some(spacing) = overrides.header_spacing {
        args.extend(["--header-spacing".to_string(), num(spacing)]);
    } else if paper.header_spacing > 0.0 {
        args.extend(["--header-spacing".to_string(), num(paper.header_spacing)]);
    }

    args.extend([
        "--margin-left".to_string(),
        num(paper.margin_left),
        "--margin-bottom".to_string(),
        num(paper.margin_bottom),
        "--margin-right".to_string(),
        num(paper.margin_right),
    ]);

    if !landscape && let Some(orientation) = paper.orientation {
        args.extend(["--orientation".to_string(), orientation.to_string()]);
    }

    if paper.header_line {
        args.push("--header-line".to_string());
    }

    if paper.disable_shrinking {
        args.push("--disable-smart-shrinking".to_string());
    }

    if landscape {
        args.extend(["--orientation".to_string(), "landscape".to_string()]);
    }

    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_default_a4_args() {
        let args = build_args(&PaperFormat::default(), false, &PaperOverrides::default(), false, true);
        assert_eq!(args[0], "--quiet");
        assert_eq!(value_after(&args, "--page-size"), Some("A4"));
        assert_eq!(value_after(&args, "--margin-top"), Some("40"));
        assert_eq!(value_after(&args, "--margin-bottom"), Some("32"));
        assert_eq!(value_after(&args, "--header-spacing"), Some("35"));
        assert_eq!(value_after(&args, "--orientation"), Some("Portrait"));
        assert!(!args.contains(&"--viewport-size".to_string()));
    }

    #[test]
    fn test_custom_format_uses_width_and_height() {
        let paper = PaperFormat {
            format: "custom".to_string(),
            page_width: Some(100.0),
            page_height: Some(150.5),
            ..Default::default()
        };
        let args = build_args(&paper, false, &PaperOverrides::default(), false, false);
        assert!(!args.contains(&"--page-size".to_string()));
        assert_eq!(value_after(&args, "--page-width"), Some("100mm"));
        assert_eq!(value_after(&args, "--page-height"), Some("150.5mm"));
        assert!(!args.contains(&"--quiet".to_string()));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = PaperOverrides {
            margin_top: Some(12.0),
            header_spacing: Some(4.0),
            dpi: Some(110),
            landscape: None,
        };
        let args = build_args(&PaperFormat::default(), false, &overrides, false, true);
        assert_eq!(value_after(&args, "--margin-top"), Some("12"));
        assert_eq!(value_after(&args, "--header-spacing"), Some("4"));
        assert_eq!(value_after(&args, "--dpi"), Some("110"));
    }

    #[test]
    fn test_landscape_replaces_paper_orientation() {
        let args = build_args(&PaperFormat::default(), true, &PaperOverrides::default(), true, true);
        assert_eq!(value_after(&args, "--viewport-size"), Some("1024x1280"));
        let orientations: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "--orientation")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(orientations, vec!["landscape"]);
        assert_eq!(args.last().unwrap(), "landscape");
    }

    #[test]
    fn test_landscape_override() {
        let overrides = PaperOverrides {
            landscape: Some(true),
            ..Default::default()
        };
        let args = build_args(&PaperFormat::default(), false, &overrides, true, true);
        assert_eq!(value_after(&args, "--viewport-size"), Some("1024x1280"));
        assert_eq!(args.last().unwrap(), "landscape");
    }

    #[test]
    fn test_zero_dpi_and_spacing_are_omitted() {
        let paper = PaperFormat {
            dpi: 0,
            header_spacing: 0.0,
            header_line: true,
            disable_shrinking: true,
            ..Default::default()
        };
        let args = build_args(&paper, false, &PaperOverrides::default(), false, true);
        assert!(!args.contains(&"--dpi".to_string()));
        assert!(!args.contains(&"--header-spacing".to_string()));
        assert!(args.contains(&"--header-line".to_string()));
        assert!(args.contains(&"--disable-smart-shrinking".to_string()));
    }

    #[test]
    fn test_validate_custom_without_size() {
        let paper = PaperFormat {
            format: "custom".to_string(),
            ..Default::default()
        };
        assert!(paper.validate().is_err());
        assert!(PaperFormat::default().validate().is_ok());
    }
}
