//! Report Backdrop CLI - render reports and manage their background rules.

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use report_backdrop_core::{
    AppConfig, Background, BackgroundFit, BackgroundMode, CompanyBackground, PaperOverrides,
    ProgressCallback, RenderInput, RenderRequest, ReportBackdrop, RuleManifest, RuleSource,
};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FitOption {
    None,
    Stretch,
    Contain,
}

impl From<FitOption> for BackgroundFit {
    fn from(opt: FitOption) -> Self {
        match opt {
            FitOption::None => Self::None,
            FitOption::Stretch => Self::Stretch,
            FitOption::Contain => Self::Contain,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "report-backdrop")]
#[command(author, version, about = "Render reports with background pages", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rule store directory
    #[arg(long, env = "REPORT_BACKDROP_STORE", global = true)]
    store: Option<PathBuf>,

    /// Path to the wkhtmltopdf binary
    #[arg(long, env = "WKHTMLTOPDF_BIN", global = true)]
    wkhtmltopdf: Option<PathBuf>,

    /// How backgrounds are scaled onto report pages
    #[arg(long, value_enum, global = true)]
    fit: Option<FitOption>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render HTML files to PDF and apply the report's backgrounds
    Render(RenderArgs),

    /// Apply a report's backgrounds to an existing PDF
    Apply {
        /// Input PDF file
        input: PathBuf,

        /// Report name the rules are stored under
        #[arg(short, long)]
        report: String,

        /// Company whose letterhead and rules apply
        #[arg(long)]
        company: Option<String>,

        /// Output PDF file (default: input-backdrop.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage report background rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Manage company backgrounds
    #[command(subcommand)]
    Company(CompanyCommand),

    /// Check that wkhtmltopdf is installed and recent enough
    Check,
}

#[derive(ClapArgs, Debug)]
struct RenderArgs {
    /// Report name the rules are stored under
    #[arg(short, long)]
    report: String,

    /// Company whose letterhead and rules apply
    #[arg(long)]
    company: Option<String>,

    /// HTML body file, one per document section (repeatable)
    #[arg(short, long = "body", required = true)]
    bodies: Vec<PathBuf>,

    /// HTML header file
    #[arg(long)]
    header: Option<PathBuf>,

    /// HTML footer file
    #[arg(long)]
    footer: Option<PathBuf>,

    /// Force landscape orientation
    #[arg(long)]
    landscape: bool,

    /// Use a 1280x1024 viewport
    #[arg(long)]
    viewport: bool,

    /// Override the top margin (mm)
    #[arg(long)]
    margin_top: Option<f32>,

    /// Override the header spacing (mm)
    #[arg(long)]
    header_spacing: Option<f32>,

    /// Override the output DPI
    #[arg(long)]
    dpi: Option<u32>,

    /// Output PDF file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Import companies and report rules from a TOML manifest
    Import {
        manifest: PathBuf,
    },
    /// List reports with background rules
    List,
    /// Show the rules of one report
    Show {
        report: String,
    },
    /// Remove the rules of one report
    Remove {
        report: String,
    },
}

#[derive(Subcommand, Debug)]
enum CompanyCommand {
    /// Set (or clear) a company's default background
    SetBackground {
        company: String,

        /// PDF, PNG or JPEG file
        #[arg(required_unless_present = "clear")]
        file: Option<PathBuf>,

        /// Remove the default background
        #[arg(long, conflicts_with = "file")]
        clear: bool,
    },
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn read_html(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).context(format!("Failed to read HTML: {}", path.display()))
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}-backdrop.pdf"))
}

fn describe_source(source: &RuleSource) -> String {
    match source {
        RuleSource::Custom { background } => {
            format!("custom background ({} bytes, md5 {})", background.len(), background.content_id())
        }
        other => other.to_string(),
    }
}

async fn render(backdrop: &ReportBackdrop, args: RenderArgs) -> Result<()> {
    let bodies = args
        .bodies
        .iter()
        .map(|p| read_html(p))
        .collect::<Result<Vec<_>>>()?;

    let input = RenderInput {
        bodies,
        header: args.header.as_deref().map(read_html).transpose()?,
        footer: args.footer.as_deref().map(read_html).transpose()?,
        landscape: args.landscape,
        paper: None,
        overrides: PaperOverrides {
            margin_top: args.margin_top,
            header_spacing: args.header_spacing,
            dpi: args.dpi,
            landscape: None,
        },
        set_viewport_size: args.viewport,
    };

    let request = RenderRequest {
        report: args.report,
        company: args.company,
        input,
    };
    let pdf = backdrop
        .render_report(&request)
        .await
        .context(format!("Failed to render {}", request.report))?;

    std::fs::write(&args.output, pdf)
        .context(format!("Failed to write output: {}", args.output.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Report saved to: {}", args.output.display());
    }
    Ok(())
}

async fn apply(
    backdrop: &ReportBackdrop,
    input: &Path,
    report: &str,
    company: Option<&str>,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Loading PDF: {}", input.display());
    let pdf = std::fs::read(input).context(format!("Failed to read PDF: {}", input.display()))?;

    let pb = progress_bar();
    let callback: ProgressCallback = {
        let pb = pb.clone();
        Box::new(move |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
    };

    let output_bytes = backdrop
        .apply_backgrounds(pdf, report, company, Some(callback))
        .await
        .context(format!("Failed to apply backgrounds of {report}"))?;
    pb.finish_and_clear();

    let output_path = output.unwrap_or_else(|| default_output(input));
    std::fs::write(&output_path, output_bytes)
        .context(format!("Failed to write output: {}", output_path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("PDF saved to: {}", output_path.display());
    }
    Ok(())
}

// CLI output is intentional
#[allow(clippy::print_stdout)]
fn rules(backdrop: &ReportBackdrop, command: RulesCommand) -> Result<()> {
    let store = backdrop.store();
    match command {
        RulesCommand::Import { manifest } => {
            let resolved = RuleManifest::load(&manifest)
                .context(format!("Failed to load manifest: {}", manifest.display()))?;
            for company in &resolved.companies {
                store.put_company(company)?;
            }
            for report in &resolved.reports {
                store.put_report(report)?;
            }
            println!(
                "Imported {} company record(s) and {} report record(s)",
                resolved.companies.len(),
                resolved.reports.len()
            );
        }
        RulesCommand::List => {
            let reports = store.reports()?;
            if reports.is_empty() {
                println!("No report rules stored");
            }
            for config in reports {
                let state = if config.enabled { "enabled" } else { "disabled" };
                println!("{:<40} {:<8} {}", config.report, state, mode_name(&config.mode));
            }
        }
        RulesCommand::Show { report } => {
            let Some(config) = store.report(&report)? else {
                bail!("No rules stored for {report}");
            };
            println!("Report:  {}", config.report);
            println!("Enabled: {}", config.enabled);
            println!("Mode:    {}", mode_name(&config.mode));
            if let BackgroundMode::ReportRules { rules } = &config.mode {
                for (i, rule) in rules.iter().enumerate() {
                    println!("  {}. {} -> {}", i + 1, rule.page, describe_source(&rule.source));
                }
            }
        }
        RulesCommand::Remove { report } => {
            if store.remove_report(&report)? {
                println!("Removed rules of {report}");
            } else {
                bail!("No rules stored for {report}");
            }
        }
    }
    Ok(())
}

const fn mode_name(mode: &BackgroundMode) -> &'static str {
    match mode {
        BackgroundMode::CompanyDefault => "company default",
        BackgroundMode::ReportRules { .. } => "report rules",
        BackgroundMode::CompanyRules => "company rules",
    }
}

// CLI output is intentional
#[allow(clippy::print_stdout)]
fn company(backdrop: &ReportBackdrop, command: CompanyCommand) -> Result<()> {
    let store = backdrop.store();
    match command {
        CompanyCommand::SetBackground {
            company,
            file,
            clear,
        } => {
            let mut record = store
                .company(&company)?
                .unwrap_or_else(|| CompanyBackground::new(company.as_str()));

            record.default_background = match file {
                Some(path) if !clear => Some(
                    Background::from_file(&path)
                        .context(format!("Failed to read background: {}", path.display()))?,
                ),
                _ => None,
            };
            store.put_company(&record)?;

            match &record.default_background {
                Some(background) => println!(
                    "Background of {} set ({} bytes)",
                    company,
                    background.len()
                ),
                None => println!("Background of {company} cleared"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(store) = args.store {
        config.store.path = Some(store);
    }
    if let Some(binary) = args.wkhtmltopdf {
        config.renderer.binary = Some(binary);
    }
    if let Some(fit) = args.fit {
        config.fit = fit.into();
    }

    let backdrop = ReportBackdrop::new(config).context("Failed to initialize")?;

    match args.command {
        Command::Render(render_args) => render(&backdrop, render_args).await,
        Command::Apply {
            input,
            report,
            company,
            output,
        } => apply(&backdrop, &input, &report, company.as_deref(), output).await,
        Command::Rules(command) => rules(&backdrop, command),
        Command::Company(command) => company(&backdrop, command),
        Command::Check => {
            let status = backdrop.renderer_status().await;
            // CLI output is intentional
            #[allow(clippy::print_stdout)]
            {
                println!("{}: {}", backdrop.renderer_info().name, status);
            }
            if !status.is_ok() {
                bail!("wkhtmltopdf is not usable");
            }
            Ok(())
        }
    }
}
