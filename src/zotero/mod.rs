//! The remote library service.
//!
//! [`LibraryClient`] is the seam between the pipeline and the Zotero Web
//! API: the pipeline only ever talks to a `dyn LibraryClient`, so tests
//! substitute an in-memory fake while the binary uses [`ZoteroClient`].

mod client;
mod types;

pub use client::ZoteroClient;
pub use types::{ItemData, ItemQuery, LibraryItem, Link, UploadReport, HTML_MIME};

use crate::error::ItemError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Operations the pipeline needs from the library service.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    /// List items matching `query`. Only the first page is returned.
    async fn list_items(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>, ItemError>;

    /// Raw content of the file stored for attachment `file_id`.
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, ItemError>;

    /// Upload `files` as new attachments of item `parent_key`.
    async fn upload_attachment(
        &self,
        files: &[PathBuf],
        parent_key: &str,
    ) -> Result<UploadReport, ItemError>;
}
