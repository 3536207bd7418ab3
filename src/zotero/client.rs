//! reqwest-backed [`LibraryClient`] for the Zotero Web API v3.
//!
//! ## Upload protocol
//!
//! Adding a file attachment takes four requests:
//!
//! ```text
//! POST /items                      create attachment item  → new key
//! POST /items/{key}/file           authorise (md5, size)   → upload slot | exists
//! POST {slot.url}                  prefix ++ file ++ suffix (storage, no API key)
//! POST /items/{key}/file           register uploadKey      → 204
//! ```
//!
//! When the authorisation step answers `exists`, the server already holds
//! identical content and the file is reported as unchanged.

use super::types::{UploadAuthorization, WriteResponse};
use super::{ItemQuery, LibraryClient, LibraryItem, UploadReport};
use crate::config::ZoteroConfig;
use crate::error::{ItemError, SyncError};
use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::{Client, RequestBuilder, Response};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, warn};

const API_VERSION: &str = "3";

/// HTTP client bound to one user or group library.
pub struct ZoteroClient {
    http: Client,
    library_url: String,
    api_key: String,
}

impl std::fmt::Debug for ZoteroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroClient")
            .field("library_url", &self.library_url)
            .finish_non_exhaustive()
    }
}

impl ZoteroClient {
    pub fn new(config: &ZoteroConfig, timeout_secs: u64) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("zotero-pdfsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            library_url: library_url(
                &config.api_base,
                config.library_type.path_segment(),
                &config.library_id,
            ),
            api_key: config.api_key.clone(),
        })
    }

    /// Attach the API version and key. Only for requests to the API itself.
    fn api(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Zotero-API-Version", API_VERSION)
            .header("Zotero-API-Key", &self.api_key)
    }

    async fn send(&self, operation: &'static str, req: RequestBuilder) -> Result<Response, ItemError> {
        let response = req
            .send()
            .await
            .map_err(|e| ItemError::service(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ItemError::Service {
                operation,
                status: Some(status.as_u16()),
                detail: body.trim().to_string(),
            });
        }
        Ok(response)
    }

    /// Create an empty `imported_file` attachment under `parent_key`.
    async fn create_attachment_item(&self, filename: &str, parent_key: &str) -> Result<String, ItemError> {
        let template = serde_json::json!([{
            "itemType": "attachment",
            "linkMode": "imported_file",
            "title": filename,
            "filename": filename,
            "contentType": "application/pdf",
            "parentItem": parent_key,
            "tags": [],
            "relations": {},
        }]);
        let req = self
            .api(self.http.post(format!("{}/items", self.library_url)))
            .json(&template);
        let written: WriteResponse = self
            .send("create_attachment", req)
            .await?
            .json()
            .await
            .map_err(|e| ItemError::service("create_attachment", e))?;

        if let Some(failure) = written.failed.values().next() {
            return Err(ItemError::Service {
                operation: "create_attachment",
                status: Some(failure.code),
                detail: failure.message.clone(),
            });
        }
        written
            .success
            .into_values()
            .next()
            .ok_or_else(|| ItemError::Service {
                operation: "create_attachment",
                status: None,
                detail: "service returned no key for the new attachment".into(),
            })
    }

    /// Upload one file; `Ok(true)` if uploaded, `Ok(false)` if already present.
    async fn upload_file(&self, path: &Path, parent_key: &str) -> Result<bool, ItemError> {
        let io_err = |e: std::io::Error| ItemError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment.pdf".to_string());
        let bytes = tokio::fs::read(path).await.map_err(io_err)?;
        let mtime_ms = tokio::fs::metadata(path)
            .await
            .map_err(io_err)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let md5 = format!("{:x}", Md5::digest(&bytes));

        let attachment_key = self.create_attachment_item(&filename, parent_key).await?;
        debug!("Created attachment {attachment_key} for {parent_key}");

        let stored = self
            .store_file(&attachment_key, &filename, parent_key, bytes, md5, mtime_ms)
            .await;
        if let Err(ref e) = stored {
            warn!(
                "Attachment {} under {} was created but has no file: {}",
                attachment_key, parent_key, e
            );
        }
        stored
    }

    /// Authorise, transfer and register the content of an existing
    /// attachment item.
    async fn store_file(
        &self,
        attachment_key: &str,
        filename: &str,
        parent_key: &str,
        bytes: Vec<u8>,
        md5: String,
        mtime_ms: u128,
    ) -> Result<bool, ItemError> {
        let file_url = format!("{}/items/{}/file", self.library_url, attachment_key);

        let auth_req = self
            .api(self.http.post(&file_url))
            .header("If-None-Match", "*")
            .form(&[
                ("md5", md5),
                ("filename", filename.to_string()),
                ("filesize", bytes.len().to_string()),
                ("mtime", mtime_ms.to_string()),
            ]);
        let auth: UploadAuthorization = self
            .send("authorize_upload", auth_req)
            .await?
            .json()
            .await
            .map_err(|e| ItemError::service("authorize_upload", e))?;

        let (url, content_type, prefix, suffix, upload_key) = match auth {
            UploadAuthorization::Exists { .. } => {
                info!("{filename} already stored for {parent_key}");
                return Ok(false);
            }
            UploadAuthorization::Upload {
                url,
                content_type,
                prefix,
                suffix,
                upload_key,
            } => (url, content_type, prefix, suffix, upload_key),
        };

        let mut body = Vec::with_capacity(prefix.len() + bytes.len() + suffix.len());
        body.extend_from_slice(prefix.as_bytes());
        body.extend_from_slice(&bytes);
        body.extend_from_slice(suffix.as_bytes());
        let storage_req = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        self.send("upload_file", storage_req).await?;

        let register_req = self
            .api(self.http.post(&file_url))
            .header("If-None-Match", "*")
            .form(&[("upload", upload_key)]);
        self.send("register_upload", register_req).await?;
        Ok(true)
    }
}

#[async_trait]
impl LibraryClient for ZoteroClient {
    async fn list_items(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>, ItemError> {
        let req = self
            .api(self.http.get(format!("{}/items", self.library_url)))
            .query(&query.to_pairs());
        let response = self.send("list_items", req).await?;
        let total = response
            .headers()
            .get("Total-Results")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let items: Vec<LibraryItem> = response
            .json()
            .await
            .map_err(|e| ItemError::service("list_items", e))?;

        if let Some(total) = total.filter(|&t| t > items.len()) {
            warn!(
                "Library has {} matching items but only the first {} are processed",
                total,
                items.len()
            );
        }
        Ok(items)
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, ItemError> {
        let req = self.api(
            self.http
                .get(format!("{}/items/{}/file", self.library_url, file_id)),
        );
        let bytes = self
            .send("fetch_file", req)
            .await?
            .bytes()
            .await
            .map_err(|e| ItemError::service("fetch_file", e))?;
        debug!("Fetched {} bytes for {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }

    async fn upload_attachment(
        &self,
        files: &[PathBuf],
        parent_key: &str,
    ) -> Result<UploadReport, ItemError> {
        let mut report = UploadReport::default();
        for path in files {
            let name = path.display().to_string();
            match self.upload_file(path, parent_key).await {
                Ok(true) => report.success.push(name),
                Ok(false) => report.unchanged.push(name),
                Err(e) => {
                    warn!("Upload of {} to {} failed: {}", name, parent_key, e);
                    report.failure.push(name);
                }
            }
        }
        Ok(report)
    }
}

/// `{api_base}/{users|groups}/{id}` without a trailing slash.
fn library_url(api_base: &str, segment: &str, library_id: &str) -> String {
    format!("{}/{}/{}", api_base.trim_end_matches('/'), segment, library_id)
}
