//! Render stage: fetch an HTML snapshot and print it to PDF.
//!
//! The snapshot is downloaded from the library, normalised to plain HTML
//! text, and handed to the [`HtmlRenderer`]. The PDF lands at a
//! deterministic path (`generated_{key}.pdf` in the working directory) and
//! stays there after the run.

use crate::error::ItemError;
use crate::renderer::HtmlRenderer;
use crate::zotero::LibraryClient;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// A rendered PDF waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub key: String,
    pub file_path: PathBuf,
}

/// Final path segment of `link`, which is the attachment's key.
pub fn file_id_from_link(link: &str) -> &str {
    let link = link.trim_end_matches('/');
    link.rsplit('/').next().unwrap_or(link)
}

/// Turn a downloaded snapshot into the HTML text handed to the renderer.
///
/// Snapshots stored as an escaped byte literal (`b'…'`) lose the two-char
/// prefix and closing quote. Line breaks are removed, whether real (`\n`)
/// or escaped (a literal backslash followed by `n`).
pub fn normalize_html(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let body = strip_byte_literal(&text);
    body.replace("\\n", "").replace('\n', "")
}

fn strip_byte_literal(text: &str) -> &str {
    for (prefix, quote) in [("b'", '\''), ("b\"", '"')] {
        if let Some(rest) = text.strip_prefix(prefix) {
            return rest.strip_suffix(quote).unwrap_or(rest);
        }
    }
    text
}

/// Download the snapshot behind `link` and render it to `output`.
pub async fn render_to_pdf(
    client: &dyn LibraryClient,
    renderer: &dyn HtmlRenderer,
    parent_key: &str,
    link: &str,
    output: PathBuf,
) -> Result<RenderedArtifact, ItemError> {
    let file_id = file_id_from_link(link);
    info!("Writing file to PDF {} {}", parent_key, link);

    let raw = client.fetch_file(file_id).await?;
    let html = normalize_html(&raw);
    debug!("Snapshot {}: {} bytes raw, {} bytes HTML", file_id, raw.len(), html.len());

    renderer.render_html_to_file(&html, &output).await?;
    info!("Converted {} → {}", parent_key, output.display());

    Ok(RenderedArtifact {
        key: parent_key.to_string(),
        file_path: output,
    })
}
