//! CLI binary for gslidegen.
//!
//! A thin shim over the library crate that gathers settings from flags and
//! environment variables, runs one export and maps the outcome to the exit
//! status (0 success, 1 aborted, 2 some pages failed).

use anyhow::{Context, Result};
use clap::Parser;
use gslidegen::config::{
    GOOGLE_DRIVE_FOLDER_ID, GOOGLE_SERVICE_ACCOUNT_PATH, TABLEAU_SERVER, TABLEAU_SITE_CONTENT_URL,
    TABLEAU_TOKEN_NAME, TABLEAU_TOKEN_SECRET,
};
use gslidegen::{
    CollisionPolicy, ExportConfig, ExportPipeline, ExportProgressCallback, ExportReport, Grantee, HttpConfig,
    Orientation, PageError, PageType, PipelineError, ProgressCallback, RunStatus, Settings, ShareRole, ShareSpec,
    UploadedFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages may finish out of
/// order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_export_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Signing in to Tableau…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Exporting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Clear the spinner when the run aborted before any page started.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_export_start(&self, workbook_name: &str, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Exporting '{workbook_name}' ({total_pages} pages)…"))
        ));
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_uploaded(&self, page: usize, total: usize, file: &UploadedFile) {
        let secs = self.elapsed_secs(page);
        let action = if file.replaced { "replaced" } else { "created" };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<16}  {}  {}",
            green("✓"),
            page,
            total,
            file.name,
            dim(action),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, error: &PageError) {
        let secs = self.elapsed_secs(page);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = format!("{} ({})", error.kind, error.stage);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_export_complete(&self, total_pages: usize, uploaded_count: usize) {
        let failed = total_pages.saturating_sub(uploaded_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages uploaded",
                green("✔"),
                bold(&uploaded_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages uploaded  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&uploaded_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Everything from the environment, first workbook on the site
  gslidegen

  # A specific workbook at 200 DPI, A4 portrait
  gslidegen --workbook 3f1c2a9e-... --dpi 200 --page-type a4 --orientation portrait

  # Only the EMEA region, files named sales_page1.png, ...
  gslidegen --workbook wb-42 --filter Region=EMEA --prefix sales

  # Make every page viewable by anyone with the link (for linked slide images)
  gslidegen --workbook wb-42 --share anyone

  # Keep local copies and print a JSON report
  gslidegen --workbook wb-42 --output-dir ./out --json > report.json

ENVIRONMENT VARIABLES:
  TABLEAU_SERVER                Tableau Server / Cloud URL, e.g. https://10ax.online.tableau.com
  TABLEAU_SITE_CONTENT_URL      Site content URL (the part after /site/ in the browser)
  TABLEAU_TOKEN_NAME            Personal access token name
  TABLEAU_TOKEN_SECRET          Personal access token secret
  GOOGLE_SERVICE_ACCOUNT_PATH   Service-account JSON key file
  GOOGLE_DRIVE_FOLDER_ID        Target folder id or folder URL
  PDFIUM_LIB_PATH               pdfium shared library (file or directory)
  RUST_LOG                      Log filter, overrides --verbose/--quiet

SHARED DRIVES:
  The service account must be a member of the Shared Drive with at least
  the Content Manager role, otherwise every upload fails with PermissionError.

EXIT STATUS:
  0  every page uploaded
  1  the run aborted (configuration, sign-in, download or page count)
  2  the run completed but at least one page failed
"#;

/// Export Tableau workbook pages as PNG images into a Google Drive folder.
#[derive(Parser, Debug)]
#[command(
    name = "gslidegen",
    version,
    about = "Export Tableau workbook pages as PNG images into a Google Drive folder",
    long_about = "Sign in to Tableau with a personal access token, export a workbook as PDF, \
render every page to PNG with pdfium and upload page1.png, page2.png, … into a Google Drive \
folder as a service account. Existing files with the same name are replaced in place.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Tableau Server / Cloud URL.
    #[arg(long, env = TABLEAU_SERVER)]
    tableau_server: Option<String>,

    /// Tableau site content URL.
    #[arg(long, env = TABLEAU_SITE_CONTENT_URL)]
    site: Option<String>,

    /// Personal access token name.
    #[arg(long, env = TABLEAU_TOKEN_NAME)]
    token_name: Option<String>,

    /// Personal access token secret.
    #[arg(long, env = TABLEAU_TOKEN_SECRET, hide_env_values = true)]
    token_secret: Option<String>,

    /// Google service-account JSON key file.
    #[arg(long, env = GOOGLE_SERVICE_ACCOUNT_PATH)]
    service_account: Option<String>,

    /// Drive folder id or folder URL.
    #[arg(long, env = GOOGLE_DRIVE_FOLDER_ID)]
    folder: Option<String>,

    /// Workbook id (LUID). Default: the first workbook on the site.
    #[arg(short, long = "workbook", env = "GSLIDEGEN_WORKBOOK_ID")]
    workbook_id: Option<String>,

    /// Rendering DPI (1–1200).
    #[arg(long, env = "GSLIDEGEN_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(1..=1200))]
    dpi: u32,

    /// Refuse workbooks with more pages than this.
    #[arg(long, env = "GSLIDEGEN_MAX_PAGES", default_value_t = 500)]
    max_pages: usize,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "GSLIDEGEN_MAX_PIXELS", default_value_t = 10_000)]
    max_pixels: u32,

    /// Refuse PDFs larger than this many MiB.
    #[arg(long, env = "GSLIDEGEN_MAX_DOCUMENT_MB", default_value_t = 256)]
    max_document_mb: u64,

    /// Paper size: a3, a4, a5, b5, executive, folio, ledger, legal, letter, note, quarto, tabloid.
    #[arg(long, env = "GSLIDEGEN_PAGE_TYPE", default_value = "letter")]
    page_type: PageType,

    /// Page orientation: portrait or landscape.
    #[arg(long, env = "GSLIDEGEN_ORIENTATION", default_value = "landscape")]
    orientation: Orientation,

    /// Maximum age in minutes of Tableau's cached data; 0 lets the server decide.
    #[arg(long, env = "GSLIDEGEN_MAX_AGE", default_value_t = 1)]
    max_age: u32,

    /// View filter, repeatable: --filter Region=EMEA --filter Year=2024
    #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// File-name prefix: <PREFIX>_page<N>.png
    #[arg(long, env = "GSLIDEGEN_PREFIX")]
    prefix: Option<String>,

    /// What to do when the folder already holds a file with the page's name.
    #[arg(long, env = "GSLIDEGEN_ON_COLLISION", value_enum, default_value = "overwrite")]
    on_collision: CollisionArg,

    /// Share each uploaded file: anyone, user:<email>, group:<email> or domain:<domain>.
    #[arg(long, env = "GSLIDEGEN_SHARE", value_name = "GRANTEE")]
    share: Option<Grantee>,

    /// Role granted by --share: reader, commenter or writer.
    #[arg(long, env = "GSLIDEGEN_SHARE_ROLE", default_value = "reader")]
    share_role: ShareRole,

    /// Pages rendered and uploaded at once.
    #[arg(short, long, env = "GSLIDEGEN_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Also write the PDF and the PNGs to this directory.
    #[arg(short, long, env = "GSLIDEGEN_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// pdfium shared library, or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Connect timeout in seconds.
    #[arg(long, env = "GSLIDEGEN_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "GSLIDEGEN_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Print the export report as JSON on stdout.
    #[arg(long, env = "GSLIDEGEN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "GSLIDEGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GSLIDEGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GSLIDEGEN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CollisionArg {
    Overwrite,
    Duplicate,
    Fail,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(v: CollisionArg) -> Self {
        match v {
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
            CollisionArg::Duplicate => CollisionPolicy::Duplicate,
            CollisionArg::Fail => CollisionPolicy::Fail,
        }
    }
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim().to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            ExitCode::from(RunStatus::Aborted.exit_code())
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<RunStatus> {
    let progress = show_progress.then(CliProgressCallback::new_dynamic);

    // ── Build settings ───────────────────────────────────────────────────
    let export = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))
        .context("Invalid configuration")?;
    let http = HttpConfig {
        connect_timeout_secs: cli.connect_timeout,
        request_timeout_secs: cli.request_timeout,
    };
    let values: HashMap<&str, Option<String>> = HashMap::from([
        (TABLEAU_SERVER, cli.tableau_server.clone()),
        (TABLEAU_SITE_CONTENT_URL, cli.site.clone()),
        (TABLEAU_TOKEN_NAME, cli.token_name.clone()),
        (TABLEAU_TOKEN_SECRET, cli.token_secret.clone()),
        (GOOGLE_SERVICE_ACCOUNT_PATH, cli.service_account.clone()),
        (GOOGLE_DRIVE_FOLDER_ID, cli.folder.clone()),
    ]);

    let settings = Settings::from_lookup(|name| values.get(name).cloned().flatten(), http, export);
    let pipeline = settings
        .and_then(|s| ExportPipeline::from_settings(&s, cli.pdfium_lib.clone()))
        .map_err(PipelineError::from);

    // ── Run export ───────────────────────────────────────────────────────
    let result = match pipeline {
        Ok(pipeline) => pipeline.run().await,
        Err(e) => Err(e),
    };
    if let Some(ref cb) = progress {
        cb.abandon();
    }
    let status = RunStatus::of(&result);

    if cli.json {
        print_json(&result, status)?;
    } else if !cli.quiet {
        match result {
            Ok(ref report) => print_summary(report, show_progress),
            Err(ref e) => eprintln!("{} {} {}", red("✘"), bold(e.kind().as_str()), e),
        }
    } else if let Err(ref e) = result {
        eprintln!("{e}");
    }

    Ok(status)
}

/// Map CLI args to `ExportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExportConfig> {
    let mut builder = ExportConfig::builder()
        .dpi(cli.dpi)
        .max_pages(cli.max_pages)
        .max_rendered_pixels(cli.max_pixels)
        .max_document_bytes(cli.max_document_mb.saturating_mul(1024 * 1024))
        .page_type(cli.page_type)
        .orientation(cli.orientation)
        .max_age_minutes((cli.max_age > 0).then_some(cli.max_age))
        .collision_policy(cli.on_collision.clone().into())
        .concurrency(cli.concurrency);

    if let Some(ref id) = cli.workbook_id {
        builder = builder.workbook_id(id.clone());
    }
    for (field, value) in &cli.filters {
        builder = builder.view_filter(field.clone(), value.clone());
    }
    if let Some(ref prefix) = cli.prefix {
        builder = builder.file_prefix(prefix.clone());
    }
    if let Some(ref grantee) = cli.share {
        builder = builder.share(ShareSpec {
            role: cli.share_role,
            grantee: grantee.clone(),
        });
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

fn print_summary(report: &ExportReport, show_progress: bool) {
    if !show_progress {
        eprintln!(
            "Exported '{}': {}/{} pages uploaded in {}ms",
            report.workbook_name,
            report.uploaded_count(),
            report.page_count,
            report.duration_ms
        );
    }
    for (page, file) in report.uploaded() {
        println!(
            "{:>4}  {:<20} {}",
            page,
            file.name,
            dim(file.web_view_link.as_deref().unwrap_or(&file.id))
        );
    }
    for err in report.failed_pages() {
        eprintln!("  {} {}", red("✗"), err);
    }
}

fn print_json(result: &Result<ExportReport, PipelineError>, status: RunStatus) -> Result<()> {
    let value = match result {
        Ok(report) => serde_json::json!({
            "status": status,
            "report": report,
        }),
        Err(e) => serde_json::json!({
            "status": status,
            "error": {
                "stage": e.stage,
                "kind": e.kind(),
                "message": e.to_string(),
            },
        }),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialise report")?
    );
    Ok(())
}
