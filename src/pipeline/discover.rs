//! Discovery: pick the HTML snapshots out of a listing of attachments.

use crate::zotero::{LibraryItem, Link, HTML_MIME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One HTML attachment to convert: the item the PDF will be attached to and
/// the link its HTML is downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub parent_key: String,
    pub source_link: String,
}

/// First link whose MIME type is `text/html`, with a trailing `/file`
/// segment removed from its href.
pub fn find_html_link(links: &BTreeMap<String, Link>) -> Option<String> {
    links
        .values()
        .find(|link| link.mime_type.as_deref() == Some(HTML_MIME))
        .map(|link| normalize_link(&link.href))
}

/// Strip a trailing `/file` path segment; any other href is returned as is.
pub fn normalize_link(href: &str) -> String {
    href.strip_suffix("/file").unwrap_or(href).to_string()
}

/// Parent key of an HTML attachment, or `None` if the item is not one.
///
/// Top-level attachments have no parent and cannot receive a sibling PDF,
/// so they are skipped as well.
pub fn html_parent(item: &LibraryItem) -> Option<&str> {
    if !item.is_html() {
        return None;
    }
    let parent = item.data.parent_item.as_deref().filter(|p| !p.is_empty());
    if parent.is_none() {
        debug!("Skipping {}: HTML attachment without parent item", item.key);
    }
    parent
}
