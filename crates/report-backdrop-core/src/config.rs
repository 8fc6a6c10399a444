use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::render::PaperFormat;

/// How a background page is placed on the content page it sits under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundFit {
    /// Keep the background at its own coordinates (plain page merge)
    None,
    /// Scale both axes independently to cover the content page box
    Stretch,
    /// Scale uniformly to fit inside the content page box, centered
    #[default]
    Contain,
}

impl BackgroundFit {
    /// Transformation matrix `[a b c d e f]` mapping `source` onto `target`.
    ///
    /// Both boxes are `[x0, y0, x1, y1]` in PDF user space.
    pub fn matrix(self, source: &[f32; 4], target: &[f32; 4]) -> [f32; 6] {
        let src_w = (source[2] - source[0]).abs();
        let src_h = (source[3] - source[1]).abs();
        let dst_w = (target[2] - target[0]).abs();
        let dst_h = (target[3] - target[1]).abs();

        if src_w <= f32::EPSILON || src_h <= f32::EPSILON {
            return [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        }

        match self {
            Self::None => [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            Self::Stretch => {
                let sx = dst_w / src_w;
                let sy = dst_h / src_h;
                [
                    sx,
                    0.0,
                    0.0,
                    sy,
                    target[0] - source[0] * sx,
                    target[1] - source[1] * sy,
                ]
            }
            Self::Contain => {
                let s = (dst_w / src_w).min(dst_h / src_h);
                let off_x = (dst_w - src_w * s) / 2.0;
                let off_y = (dst_h - src_h * s) / 2.0;
                [
                    s,
                    0.0,
                    0.0,
                    s,
                    target[0] + off_x - source[0] * s,
                    target[1] + off_y - source[1] * s,
                ]
            }
        }
    }
}

/// Renderer subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Explicit path to the wkhtmltopdf binary (looked up on PATH when unset)
    pub binary: Option<PathBuf>,

    /// Extra arguments appended after the paper format arguments
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Subprocess timeout in seconds (0 = wait forever)
    #[serde(default)]
    pub timeout_seconds: u64,

    /// Pass `--quiet` for less verbose error messages
    #[serde(default = "default_true")]
    pub quiet: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binary: None,
            extra_args: Vec::new(),
            timeout_seconds: 0,
            quiet: true,
        }
    }
}

/// Rule store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Enable the persistent store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Store directory (defaults to $XDG_DATA_HOME/report-backdrop)
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Decoded background cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum decoded backgrounds kept in memory
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

const fn default_cache_max_entries() -> u64 {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Renderer subprocess configuration
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Default paper format when a render request has none
    #[serde(default)]
    pub paper: PaperFormat,

    /// Rule store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Decoded background cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background placement
    #[serde(default)]
    pub fit: BackgroundFit,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, crate::error::Error> {
        let config: Self = toml::from_str(content).map_err(|e| {
            crate::error::Error::ConfigLoad(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), crate::error::Error> {
        if self.cache.max_entries == 0 {
            return Err(crate::error::Error::ConfigInvalid {
                field: "cache.max_entries".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.paper.validate()
    }

    /// Load from default locations (~/.config/report-backdrop/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("report-backdrop").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = std::path::PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        // Return defaults
        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Rule store location, falling back to the XDG data directory
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(crate::util::rule_store_path)
    }
}
