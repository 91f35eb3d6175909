//! Developer CLI for membership-form.
//!
//! Runs a JSON drafts file through a full session: validation, stamping
//! and, when asked, upload. Mostly used to calibrate field layouts against a
//! new template revision.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use membership_form::{
    ClientEnvironment, FieldLayout, FormConfig, FormError, PaymentInput, PersonInput,
    ProgressCallback, ResourceSource, Session, SubmissionProgressCallback, UploadKind, UploadMode,
};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SubmissionProgressCallback for CliProgressCallback {
    fn on_stamp_start(&self) {
        self.bar.set_prefix("Stamping");
        self.bar.set_message("fetching template and font…");
    }

    fn on_stamp_complete(&self, pdf_len: usize) {
        self.bar.println(format!(
            "  {} PDF stamped  {}",
            green("✓"),
            dim(&format!("{pdf_len} bytes"))
        ));
        self.bar.set_message("");
    }

    fn on_upload_start(&self, kind: UploadKind) {
        self.bar.set_prefix("Uploading");
        self.bar.set_message(kind.to_string());
    }

    fn on_upload_complete(&self, kind: UploadKind, url: &str) {
        self.bar
            .println(format!("  {} {} stored  {}", green("✓"), kind, dim(url)));
    }

    fn on_upload_error(&self, kind: UploadKind, error: &str) {
        self.bar
            .println(format!("  {} {} upload failed  {}", red("✗"), kind, red(error)));
    }
}

const AFTER_HELP: &str = r#"DRAFTS FILE:
  {
    "primary":     { "id_number": "…", "first_name": "…", …, "include_spouse": true },
    "spouse":      { … },
    "payment":     { "cardholder_name": "…", "payer": "primary", … },
    "environment": { "userAgent": "…", "language": "he-IL", "timezone": "Asia/Jerusalem" }
  }

  Signatures are data URLs ("data:image/png;base64,…"). With --signature-font,
  unsigned screens are signed from the typed name.

EXAMPLES:
  # Stamp locally
  formstamp drafts.json --template form.pdf --font Rubik-Regular.ttf -o out/form.pdf

  # Calibrate a new layout (debug builds only)
  formstamp drafts.json --template form.pdf --font Rubik.ttf --layout v2.json --grid

  # Full submission
  formstamp drafts.json --template https://cdn.example.org/form.pdf \
      --font Rubik.ttf --upload-endpoint https://functions.example.org/api --upload
"#;

/// Fill the membership form from a drafts file.
#[derive(Parser, Debug)]
#[command(
    name = "formstamp",
    version,
    about = "Fill the membership form from a drafts file",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON drafts file.
    drafts: PathBuf,

    /// Blank form PDF (path or URL).
    #[arg(long, env = "FORMSTAMP_TEMPLATE")]
    template: String,

    /// TrueType font for stamped text (path or URL).
    #[arg(long, env = "FORMSTAMP_FONT")]
    font: String,

    /// Cursive font for automatic signatures (path or URL).
    #[arg(long, env = "FORMSTAMP_SIGNATURE_FONT")]
    signature_font: Option<String>,

    /// Field layout JSON. Default: the built-in layout.
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Where to write the stamped PDF.
    #[arg(short, long, default_value = "output/form.pdf")]
    output: PathBuf,

    /// Overlay the 50 pt calibration grid.
    #[arg(long)]
    grid: bool,

    /// Date printed on the form (YYYY-MM-DD). Default: today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Base URL of the upload functions.
    #[arg(long, env = "FORMSTAMP_UPLOAD_ENDPOINT")]
    upload_endpoint: Option<String>,

    /// Upload through a signed URL instead of the direct function.
    #[arg(long)]
    signed_url: bool,

    /// Confirm the submission after stamping.
    #[arg(long, requires = "upload_endpoint")]
    upload: bool,

    /// JSON array of accepted birth countries (path or URL).
    #[arg(long, env = "FORMSTAMP_COUNTRY_LIST")]
    country_list: Option<String>,

    /// Timeout for every download and upload, in seconds. 0 = none.
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct Drafts {
    primary: PersonInput,
    #[serde(default)]
    spouse: Option<PersonInput>,
    payment: PaymentInput,
    #[serde(default)]
    environment: ClientEnvironment,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let raw = tokio::fs::read(&cli.drafts)
        .await
        .with_context(|| format!("Failed to read drafts from {:?}", cli.drafts))?;
    let drafts: Drafts = serde_json::from_slice(&raw).context("Drafts file is not valid JSON")?;

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress: Option<ProgressCallback> = spinner
        .clone()
        .map(|cb| cb as Arc<dyn SubmissionProgressCallback>);
    let config = build_config(&cli, progress).await?;

    let mut session = Session::from_config(&config)
        .await
        .context("Failed to set up the session")?;
    if let Some(date) = cli.date {
        let at = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap_or_default());
        session = session.with_clock(move || at);
    }

    screen("personal details", session.submit_primary(drafts.primary))?;
    if session.stage() == membership_form::Stage::Spouse {
        let Some(spouse) = drafts.spouse else {
            bail!("include_spouse is set but the drafts file has no \"spouse\" entry");
        };
        screen("spouse details", session.submit_spouse(spouse))?;
    }
    screen("payment details", session.submit_payment(drafts.payment).await)?;

    session
        .save_preview(&cli.output)
        .await
        .context("Failed to write the stamped PDF")?;
    if let Some(cb) = spinner.as_ref().filter(|_| !cli.upload) {
        cb.bar.finish_and_clear();
    }
    if !cli.quiet {
        eprintln!("{} {}", green("✔"), bold(&cli.output.display().to_string()));
    }

    if cli.upload {
        let receipt = session
            .confirm(&drafts.environment)
            .await
            .context("Submission failed")?;
        if let Some(cb) = &spinner {
            cb.bar.finish_and_clear();
        }
        if !cli.quiet {
            eprintln!("{} submitted as {}", green("✔"), bold(receipt.context.as_str()));
            eprintln!("   pdf:      {}", receipt.pdf_url);
            eprintln!("   metadata: {}", receipt.metadata_url);
        }
    }
    Ok(())
}

/// Print every field error of a rejected screen before bailing.
fn screen<T>(name: &str, result: Result<T, FormError>) -> Result<T> {
    match result {
        Err(FormError::Validation(errors)) => {
            eprintln!("{} {} rejected:", red("✘"), bold(name));
            for e in errors.iter() {
                eprintln!("   {:<18} {}", e.field, e.message);
            }
            bail!("{} invalid field(s) on {}", errors.len(), name)
        }
        other => other.with_context(|| format!("Failed to submit {name}")),
    }
}

/// Map CLI args to `FormConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FormConfig> {
    let mut builder = FormConfig::builder()
        .template(ResourceSource::parse(&cli.template)?)
        .text_font(ResourceSource::parse(&cli.font)?)
        .download_timeout_secs(cli.timeout)
        .debug_grid(cli.grid)
        .upload_mode(if cli.signed_url {
            UploadMode::SignedUrl
        } else {
            UploadMode::Direct
        });

    if let Some(ref font) = cli.signature_font {
        builder = builder.signature_font(ResourceSource::parse(font)?);
    }
    if let Some(ref path) = cli.layout {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read layout from {:?}", path))?;
        builder = builder.layout(FieldLayout::from_json(&bytes)?);
    }
    if let Some(ref url) = cli.upload_endpoint {
        builder = builder.upload_endpoint(url.clone());
    }
    if let Some(ref url) = cli.country_list {
        builder = builder.country_list_url(url.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
