//! wkhtmltopdf subprocess backend.
//!
//! Every HTML part is written to its own temporary file, the binary is run
//! once for the whole report and the resulting PDF is read back. Exit code
//! 1 is what wkhtmltopdf returns when some resource (an image, a font)
//! failed to load but a PDF was still produced, so it counts as success.

use async_trait::async_trait;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::paper::{PaperFormat, build_args};
use super::traits::{HtmlRenderer, RenderInput, RendererInfo, RendererStatus};
use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::util::looks_like_pdf;

const BINARY_NAME: &str = "wkhtmltopdf";

/// Oldest release with the header/footer behaviour reports rely on.
const MIN_VERSION: [u32; 3] = [0, 12, 0];

// Pattern is hardcoded and valid, expect is safe
#[allow(clippy::expect_used)]
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)*").expect("version pattern is valid"));

/// wkhtmltopdf renderer
pub struct Wkhtmltopdf {
    binary: Option<PathBuf>,
    paper: PaperFormat,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    quiet: bool,
}

impl Wkhtmltopdf {
    /// Create a renderer, locating the binary on PATH unless configured.
    pub fn new(config: &RendererConfig, paper: PaperFormat) -> Self {
        let binary = config
            .binary
            .clone()
            .or_else(|| which::which(BINARY_NAME).ok());

        match binary {
            Some(ref path) => info!(path = %path.display(), "wkhtmltopdf found"),
            None => warn!("wkhtmltopdf not found in PATH - rendering will fail"),
        }

        Self {
            binary,
            paper,
            extra_args: config.extra_args.clone(),
            timeout: (config.timeout_seconds > 0)
                .then(|| Duration::from_secs(config.timeout_seconds)),
            quiet: config.quiet,
        }
    }

    fn binary(&self) -> Result<&PathBuf> {
        self.binary
            .as_ref()
            .ok_or_else(|| Error::RendererNotFound(BINARY_NAME.to_string()))
    }

    /// Arguments derived from the paper format, before any file argument.
    pub fn base_args(&self, input: &RenderInput) -> Vec<String> {
        let paper = input.paper.as_ref().unwrap_or(&self.paper);
        let mut args = build_args(
            paper,
            input.landscape,
            &input.overrides,
            input.set_viewport_size,
            self.quiet,
        );
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn render_to(&self, args: &[String], report_path: &std::path::Path) -> Result<Vec<u8>> {
        let output = self.run(args).await?;
        check_exit(output.status.code(), &output.stderr)?;

        let pdf = tokio::fs::read(report_path).await?;
        if pdf.is_empty() {
            return Err(Error::RendererOutput("output file is empty".to_string()));
        }
        if !looks_like_pdf(&pdf) {
            return Err(Error::RendererOutput("output is not a PDF".to_string()));
        }
        Ok(pdf)
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        let binary = self.binary()?;
        debug!("Running {} with {} arguments", binary.display(), args.len());

        let mut command = Command::new(binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| Error::RendererTimeout(limit.as_secs()))?,
            None => command.output().await,
        };

        output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::RendererNotFound(binary.display().to_string())
            } else {
                Error::Io(e)
            }
        })
    }
}

#[async_trait]
impl HtmlRenderer for Wkhtmltopdf {
    fn info(&self) -> RendererInfo {
        RendererInfo { name: BINARY_NAME }
    }

    async fn render(&self, input: &RenderInput) -> Result<Vec<u8>> {
        if input.bodies.is_empty() {
            return Err(Error::RendererOutput("no HTML bodies to render".to_string()));
        }
        self.binary()?;

        let mut temporary_files: Vec<TempPath> = Vec::new();
        let mut file_args: Vec<String> = Vec::new();

        if let Some(header) = input.header.as_deref().filter(|h| !h.is_empty()) {
            let path = write_temp("report.header.tmp.", ".html", header.as_bytes())?;
            file_args.extend(["--header-html".to_string(), path.display().to_string()]);
            temporary_files.push(path);
        }
        if let Some(footer) = input.footer.as_deref().filter(|f| !f.is_empty()) {
            let path = write_temp("report.footer.tmp.", ".html", footer.as_bytes())?;
            file_args.extend(["--footer-html".to_string(), path.display().to_string()]);
            temporary_files.push(path);
        }

        let mut body_args: Vec<String> = Vec::with_capacity(input.bodies.len());
        for (i, body) in input.bodies.iter().enumerate() {
            let path = write_temp(&format!("report.body.tmp.{i}."), ".html", body.as_bytes())?;
            body_args.push(path.display().to_string());
            temporary_files.push(path);
        }

        let report_path = write_temp("report.tmp.", ".pdf", &[])?;
        let report_display = report_path.display().to_string();

        let mut args = self.base_args(input);
        args.extend(file_args);
        args.extend(body_args);
        args.push(report_display);

        let result = self.render_to(&args, &report_path).await;

        temporary_files.push(report_path);
        remove_temporary_files(temporary_files);

        if let Ok(ref pdf) = result {
            info!("Rendered {} bodies into {} bytes", input.bodies.len(), pdf.len());
        }
        result
    }

    async fn status(&self) -> RendererStatus {
        let Some(ref binary) = self.binary else {
            return RendererStatus::Install;
        };

        let mut command = Command::new(binary);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => output,
                Err(_) => {
                    return RendererStatus::Broken(format!(
                        "--version timed out after {} seconds",
                        limit.as_secs()
                    ));
                }
            },
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RendererStatus::Install,
            Err(e) => return RendererStatus::Broken(e.to_string()),
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let Some(version) = extract_version(&text) else {
            return RendererStatus::Broken(format!(
                "could not read version from '{}'",
                text.trim()
            ));
        };

        if version_parts(&version) < MIN_VERSION.to_vec() {
            warn!("Upgrade wkhtmltopdf to at least 0.12.0 (found {version})");
            RendererStatus::Upgrade(version)
        } else {
            RendererStatus::Ok(version)
        }
    }
}

/// Interpret the renderer exit status.
pub fn check_exit(code: Option<i32>, stderr: &[u8]) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(1) => {
            warn!(
                "wkhtmltopdf reported recoverable errors: {}",
                String::from_utf8_lossy(stderr).trim()
            );
            Ok(())
        }
        _ => Err(Error::RendererFailed {
            code,
            message: String::from_utf8_lossy(stderr).trim().to_string(),
        }),
    }
}

/// First dotted number in the `--version` output.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION_RE.find(text).map(|m| m.as_str().to_string())
}

fn version_parts(version: &str) -> Vec<u32> {
    let mut parts: Vec<u32> = version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect();
    while parts.len() < MIN_VERSION.len() {
        parts.push(0);
    }
    parts
}

fn write_temp(prefix: &str, suffix: &str, content: &[u8]) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

fn remove_temporary_files(files: Vec<TempPath>) {
    for file in files {
        let path_str = file.display().to_string();
        if let Err(e) = file.close() {
            error!("Error when trying to remove file {}: {}", path_str, e);
        }
    }
}
