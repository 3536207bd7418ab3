//! Upload stage: attach a rendered PDF to its parent item.

use crate::error::ItemError;
use crate::zotero::{LibraryClient, UploadReport};
use std::path::Path;
use tracing::info;

/// Upload `file_path` as an attachment of item `key`.
///
/// A report with refused files is returned as [`ItemError::UploadRejected`]
/// so the call is not memoised and the next run tries again.
pub async fn upload_pdf(
    client: &dyn LibraryClient,
    key: &str,
    file_path: &Path,
) -> Result<UploadReport, ItemError> {
    info!("Uploading PDF to Zotero {} {}", key, file_path.display());
    let report = client
        .upload_attachment(&[file_path.to_path_buf()], key)
        .await?;
    info!(
        "Upload {}: {} uploaded, {} unchanged, {} failed",
        key,
        report.success.len(),
        report.unchanged.len(),
        report.failure.len()
    );
    if !report.is_success() {
        return Err(ItemError::UploadRejected {
            key: key.to_string(),
            failed: report.failure,
        });
    }
    Ok(report)
}
