//! Error types for the zotero-pdfsync library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SyncError`] — **Fatal**: the run cannot start at all (config file
//!   missing or incomplete, working directory not creatable, HTTP client not
//!   buildable). Returned before any call to the library service is made.
//!
//! * [`ItemError`] — **Non-fatal**: a single attachment failed (renderer
//!   crashed, service returned 404, cache entry unwritable) but every other
//!   attachment is still attempted. Stored inside
//!   [`crate::sync::ItemOutcome::Failed`].
//!
//! Failed calls are never memoised, so an item that produced an
//! [`ItemError`] is retried on the next run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the zotero-pdfsync library.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The configuration file does not exist.
    #[error("Config file not found: '{path}'\nCreate it with [zotero] and [system] sections.")]
    ConfigNotFound { path: PathBuf },

    /// The configuration file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax error or a required key is missing.
    #[error("Invalid config file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// Values parsed but failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the working directory for generated PDFs.
    #[error("Failed to create working directory '{path}': {source}")]
    WorkDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create the memoisation directory.
    #[error("Failed to open cache directory '{path}': {detail}")]
    CacheOpen { path: PathBuf, detail: String },

    /// Could not remove a local directory during cleanup.
    #[error("Failed to remove '{path}': {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Service errors ────────────────────────────────────────────────────
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Listing the library failed, so there is nothing to process.
    #[error("Failed to list library items: {0}")]
    Discovery(#[source] ItemError),
}

/// A non-fatal error for a single attachment.
///
/// The driver logs it together with the offending item and moves on.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The renderer reported failure.
    #[error("Rendering '{key}' failed: {detail}")]
    Render { key: String, detail: String },

    /// The renderer did not finish in time and was killed.
    #[error("Rendering '{key}' timed out after {secs}s")]
    RenderTimeout { key: String, secs: u64 },

    /// Any failure talking to the library service (network, auth, not-found).
    #[error("Library service call '{operation}' failed{}: {detail}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Service {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// The service accepted the request but refused one or more files.
    #[error("Upload to '{key}' rejected for: {}", failed.join(", "))]
    UploadRejected { key: String, failed: Vec<String> },

    /// The memoisation store could not be read or written.
    #[error("Cache error at '{path}': {detail}")]
    Cache { path: PathBuf, detail: String },

    /// Local file I/O failed (reading the generated PDF, writing temp HTML).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ItemError {
    /// Build a [`ItemError::Service`] from a reqwest error.
    pub(crate) fn service(operation: &'static str, err: reqwest::Error) -> Self {
        Self::Service {
            operation,
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }

    /// Returns `true` for errors raised by the memoisation layer rather than
    /// by the wrapped render/upload call.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::Cache { .. })
    }
}
