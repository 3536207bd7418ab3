//! CLI binary for zotero-pdfsync.
//!
//! A thin shim over the library crate: load `config.toml`, run one sync
//! pass, print a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use zotero_pdfsync::{
    run_with_trigger, Config, ProgressCallback, SyncPipeline, SyncProgressCallback,
};

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

/// Terminal progress callback: a spinner while the library is listed, then a
/// bar with one log line per item.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-item wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Discovering");
        bar.set_message("Listing attachments…");
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
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
    }

    fn elapsed(&self, key: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(key))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl SyncProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        self.activate_bar(total_items);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_items} HTML attachments"))
        ));
    }

    fn on_item_start(&self, key: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(key.to_string(), Instant::now());
        }
        self.bar.set_message(key.to_string());
    }

    fn on_item_complete(&self, key: &str, pdf: &Path) {
        let secs = self.elapsed(key);
        self.bar.println(format!(
            "  {} {:<10}  {}  {}",
            green("✓"),
            key,
            dim(&pdf.display().to_string()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, key: &str, error: &str) {
        let secs = self.elapsed(key);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((idx, _)) => format!("{}\u{2026}", &error[..idx]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} {:<10}  {}  {}",
            red("✗"),
            key,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        let failed = total_items.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} attachments converted and uploaded",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} attachments converted  ({} failed, see log)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"CONFIG FILE (config.toml):
  [zotero]
  library_id       = "1234567"
  zotero_api_key   = "..."
  zotero_directory = "/home/me/Zotero"
  # library_type   = "user"          # or "group"

  [system]
  path_to_chrome_exe = "/usr/bin/google-chrome"
  save_dir           = "/tmp/zotero-converter"
  # cache_dir        = "~/.temp/.cache"

EXAMPLES:
  # Convert every HTML snapshot and upload the PDFs
  zotero-pdfsync

  # Use another config file, with debug logs
  zotero-pdfsync --config ~/zotero.toml --verbose

  # Remove generated PDFs and the call cache
  zotero-pdfsync --cleanup

NOTES:
  Only the first 100 attachments of the library are processed.
  Completed renders and uploads are remembered in the cache directory;
  re-running only retries what failed.
"#;

/// Convert HTML snapshots in a Zotero library to PDF and upload them back.
#[derive(Parser, Debug)]
#[command(
    name = "zotero-pdfsync",
    version,
    about = "Convert HTML snapshots in a Zotero library to PDF and upload them back",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "ZOTERO_PDFSYNC_CONFIG", default_value = zotero_pdfsync::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Remove the working directory and the call cache, then exit.
    #[arg(long)]
    cleanup: bool,

    /// Disable progress bar.
    #[arg(long, env = "ZOTERO_PDFSYNC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ZOTERO_PDFSYNC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ZOTERO_PDFSYNC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.cleanup;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::warn!("Only the first 100 documents are currently supported");

    // ── Build pipeline ───────────────────────────────────────────────────
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let mut pipeline = SyncPipeline::from_config(config).context("Failed to set up sync")?;

    if cli.cleanup {
        pipeline.cleanup().context("Cleanup failed")?;
        if !cli.quiet {
            eprintln!("{} local directories removed", green("✔"));
        }
        return Ok(());
    }

    pipeline.create_work_dir()?;

    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        pipeline = pipeline.with_progress(cb);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let start = Instant::now();
    run_with_trigger(&pipeline, None)
        .await
        .context("Sync failed")?;

    if !cli.quiet && !show_progress {
        eprintln!("Done in {}ms", start.elapsed().as_millis());
    }

    Ok(())
}
