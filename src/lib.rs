//! # zotero-pdfsync
//!
//! Convert the HTML snapshots in a Zotero library to PDF and attach the PDFs
//! back to the same parent items.
//!
//! Web-page snapshots are stored by Zotero as `text/html` attachments, which
//! most readers and annotation tools cannot open. This crate finds them
//! through the Zotero Web API, prints each one to PDF with a headless
//! Chrome/Chromium, and uploads the PDF as a new attachment.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Zotero library
//!  │
//!  ├─ 1. Discover  list attachments, keep text/html ones with a parent
//!  ├─ 2. Render    download snapshot → headless Chrome → generated_{key}.pdf
//!  └─ 3. Upload    attach the PDF to the parent item
//! ```
//!
//! Every step is memoised on disk ([`MemoCache`]): a re-run skips items that
//! were already rendered and uploaded, and retries only what failed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zotero_pdfsync::{Config, SyncPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     let pipeline = SyncPipeline::from_config(config)?;
//!     pipeline.create_work_dir()?;
//!     for outcome in pipeline.run_once().await? {
//!         println!("{} uploaded: {}", outcome.task().parent_key, outcome.is_uploaded());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Known limitation
//!
//! Only the first page of the attachment listing (100 items) is processed.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `zotero-pdfsync` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod renderer;
pub mod sync;
pub mod watch;
pub mod zotero;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::MemoCache;
pub use config::{Config, ConfigBuilder, LibraryType, SystemConfig, ZoteroConfig};
pub use error::{ItemError, SyncError};
pub use pipeline::discover::ConversionTask;
pub use pipeline::render::RenderedArtifact;
pub use progress::{NoopProgressCallback, ProgressCallback, SyncProgressCallback};
pub use renderer::{ChromeRenderer, HtmlRenderer};
pub use sync::{ItemOutcome, SyncPipeline};
pub use watch::{run_with_trigger, ChannelTrigger, Trigger};
pub use zotero::{ItemQuery, LibraryClient, LibraryItem, UploadReport, ZoteroClient};
