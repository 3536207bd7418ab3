//! Progress-callback trait for per-attachment sync events.
//!
//! Attach an [`Arc<dyn SyncProgressCallback>`] via
//! [`crate::sync::SyncPipeline::with_progress`] to receive events as the
//! driver walks the discovered attachments.
//!
//! # Example
//!
//! ```rust
//! use zotero_pdfsync::SyncProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl SyncProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, key: &str, _pdf: &std::path::Path) {
//!         let done = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{key} uploaded ({done} so far)");
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the driver as it processes each attachment.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Items are processed one after another, but the
/// trait is `Send + Sync` so implementations can be shared with other tasks.
pub trait SyncProgressCallback: Send + Sync {
    /// Called once after discovery, before the first item is rendered.
    ///
    /// # Arguments
    /// * `total_items` — number of conversion tasks discovered
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before an item is rendered.
    fn on_item_start(&self, key: &str) {
        let _ = key;
    }

    /// Called when an item's PDF was rendered and uploaded.
    ///
    /// # Arguments
    /// * `key` — parent item key
    /// * `pdf` — path of the generated PDF
    fn on_item_complete(&self, key: &str, pdf: &Path) {
        let _ = (key, pdf);
    }

    /// Called when an item failed; the run continues with the next one.
    fn on_item_error(&self, key: &str, error: &str) {
        let _ = (key, error);
    }

    /// Called once after every discovered item has been attempted.
    ///
    /// # Arguments
    /// * `total_items`   — number of tasks attempted
    /// * `success_count` — tasks that ended uploaded
    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is attached.
pub struct NoopProgressCallback;

impl SyncProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by [`crate::sync::SyncPipeline`].
pub type ProgressCallback = Arc<dyn SyncProgressCallback>;
