//! Wire types returned by the Zotero Web API (v3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// MIME type of HTML snapshots and of links pointing at them.
pub const HTML_MIME: &str = "text/html";

/// An item record as returned by `GET /{users|groups}/{id}/items`.
///
/// Only the fields the sync needs are typed; everything else the service
/// sends in `data` is kept in [`ItemData::extra`] so the full record can be
/// logged when an item fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    /// Named links (`self`, `alternate`, `up`, `enclosure`, …).
    #[serde(default)]
    pub links: BTreeMap<String, Link>,
    pub data: ItemData,
}

/// A single entry of an item's `links` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
}

/// The `data` object of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub item_type: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub parent_item: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LibraryItem {
    /// Whether this is a web-page snapshot (`contentType` exactly `text/html`).
    pub fn is_html(&self) -> bool {
        self.data.content_type.as_deref() == Some(HTML_MIME)
    }
}

/// Filter for listing items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub item_type: Option<String>,
    /// Page size; the service caps it at 100.
    pub limit: u32,
}

impl ItemQuery {
    /// All attachment items, first page.
    pub fn attachments() -> Self {
        Self {
            item_type: Some("attachment".to_string()),
            limit: 100,
        }
    }

    /// Query-string pairs for the request.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("format", "json".to_string()), ("limit", self.limit.to_string())];
        if let Some(ref t) = self.item_type {
            pairs.push(("itemType", t.clone()));
        }
        pairs
    }
}

/// Outcome of uploading one or more files as attachments of a parent item.
///
/// Each list holds file names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub success: Vec<String>,
    pub failure: Vec<String>,
    /// The service already had identical content.
    pub unchanged: Vec<String>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_empty()
    }
}

/// Response of `POST /items` (item creation).
#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponse {
    #[serde(default)]
    pub success: BTreeMap<String, String>,
    #[serde(default)]
    pub failed: BTreeMap<String, WriteFailure>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteFailure {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Response of the upload-authorisation request.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum UploadAuthorization {
    /// The server already holds a file with this MD5.
    Exists { exists: u8 },
    #[serde(rename_all = "camelCase")]
    Upload {
        url: String,
        content_type: String,
        prefix: String,
        suffix: String,
        upload_key: String,
    },
}
