//! The sync driver: discovery → render → upload for every HTML attachment.
//!
//! [`SyncPipeline`] owns its collaborators (library client, renderer,
//! memoisation cache) and exposes each pipeline step as a memoised method
//! plus [`SyncPipeline::run_once`], which drives every discovered item
//! through the steps.
//!
//! ## Failure policy
//!
//! Items are processed one after another. A failure on one item is logged
//! with the full item record and recorded as [`ItemOutcome::Failed`]; the
//! loop always moves on. Items uploaded before the failure stay uploaded.
//! Nothing is retried within a run: a failed call is not memoised, so the
//! next run attempts it again, while successful calls are skipped.

use crate::cache::MemoCache;
use crate::config::Config;
use crate::error::{ItemError, SyncError};
use crate::pipeline::discover::{self, ConversionTask};
use crate::pipeline::render::{self, RenderedArtifact};
use crate::pipeline::upload;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::renderer::{ChromeRenderer, HtmlRenderer};
use crate::zotero::{ItemQuery, LibraryClient, LibraryItem, UploadReport, ZoteroClient};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Memoisation identity of the link lookup.
pub const FIND_HTML_LINK: &str = "find_html_link";
/// Memoisation identity of the render step.
pub const RENDER_TO_PDF: &str = "render_to_pdf";
/// Memoisation identity of the upload step.
pub const UPLOAD_PDF: &str = "upload_pdf";

/// Terminal state of one item after a run.
#[derive(Debug)]
pub enum ItemOutcome {
    Uploaded {
        task: ConversionTask,
        artifact: RenderedArtifact,
        report: UploadReport,
    },
    Failed {
        task: ConversionTask,
        error: ItemError,
    },
}

impl ItemOutcome {
    pub fn task(&self) -> &ConversionTask {
        match self {
            ItemOutcome::Uploaded { task, .. } | ItemOutcome::Failed { task, .. } => task,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, ItemOutcome::Uploaded { .. })
    }
}

/// Discovery → render → upload over one library, with durable memoisation.
pub struct SyncPipeline {
    config: Config,
    client: Arc<dyn LibraryClient>,
    renderer: Arc<dyn HtmlRenderer>,
    cache: MemoCache,
    progress: ProgressCallback,
}

impl std::fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl SyncPipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        config: Config,
        client: Arc<dyn LibraryClient>,
        renderer: Arc<dyn HtmlRenderer>,
    ) -> Result<Self, SyncError> {
        let cache = MemoCache::open(&config.system.cache_dir).map_err(|e| SyncError::CacheOpen {
            path: config.system.cache_dir.clone(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            config,
            client,
            renderer,
            cache,
            progress: Arc::new(NoopProgressCallback),
        })
    }

    /// Production wiring: Zotero Web API client and headless Chrome.
    pub fn from_config(config: Config) -> Result<Self, SyncError> {
        let client = ZoteroClient::new(&config.zotero, config.system.http_timeout_secs)?;
        let renderer = ChromeRenderer::new(
            config.system.renderer_path.clone(),
            config.system.render_timeout_secs,
        );
        Self::new(config, Arc::new(client), Arc::new(renderer))
    }

    /// Receive per-item progress events.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }

    /// Create the working directory if it does not exist yet.
    pub fn create_work_dir(&self) -> Result<(), SyncError> {
        info!("Initialising {}", self.config.system.work_dir.display());
        let path = &self.config.system.work_dir;
        std::fs::create_dir_all(path).map_err(|e| SyncError::WorkDirCreate {
            path: path.clone(),
            source: e,
        })
    }

    /// Remove the working directory and the cache directory.
    ///
    /// Never called by [`Self::run_once`]; generated PDFs and memoised
    /// results persist until this is requested explicitly.
    pub fn cleanup(&self) -> Result<(), SyncError> {
        info!("Cleaning up local directories");
        remove_dir(&self.config.system.work_dir)?;
        self.cache.clear().map_err(|e| SyncError::Cleanup {
            path: self.cache.dir().to_path_buf(),
            source: e,
        })
    }

    /// List the library and return a task for every HTML snapshot that has
    /// a parent item and an HTML link.
    ///
    /// Top-level HTML attachments (no `parentItem`) are skipped even when
    /// they carry an HTML link: there is no item to attach the PDF to.
    pub async fn discover_attachments(&self) -> Result<Vec<ConversionTask>, ItemError> {
        Ok(self
            .discover_items()
            .await?
            .into_iter()
            .map(|(_, task)| task)
            .collect())
    }

    async fn discover_items(&self) -> Result<Vec<(LibraryItem, ConversionTask)>, ItemError> {
        info!(
            "Discovering files in online Zotero library {}",
            self.config.zotero.library_id
        );
        let items = self.client.list_items(&ItemQuery::attachments()).await?;
        let listed = items.len();

        let mut found = Vec::new();
        for item in items {
            let Some(parent_key) = discover::html_parent(&item).map(str::to_string) else {
                continue;
            };
            let link: Option<String> = self
                .cache
                .get_or_compute(FIND_HTML_LINK, &item.links, || async {
                    Ok(discover::find_html_link(&item.links))
                })
                .await?;
            match link {
                Some(source_link) => found.push((
                    item,
                    ConversionTask {
                        parent_key,
                        source_link,
                    },
                )),
                None => debug!("Skipping {}: no text/html link", item.key),
            }
        }
        info!("{} of {} attachments are HTML snapshots", found.len(), listed);
        Ok(found)
    }

    /// Render the snapshot behind `link` to `generated_{parent_key}.pdf`.
    /// Memoised on `(parent_key, link)`.
    pub async fn render_to_pdf(
        &self,
        parent_key: &str,
        link: &str,
    ) -> Result<RenderedArtifact, ItemError> {
        self.cache
            .get_or_compute(RENDER_TO_PDF, &(parent_key, link), || {
                render::render_to_pdf(
                    self.client.as_ref(),
                    self.renderer.as_ref(),
                    parent_key,
                    link,
                    self.config.output_path(parent_key),
                )
            })
            .await
    }

    /// Upload `file_path` as an attachment of `key`. Memoised on
    /// `(key, file_path)`.
    pub async fn upload_pdf(&self, key: &str, file_path: &Path) -> Result<UploadReport, ItemError> {
        self.cache
            .get_or_compute(UPLOAD_PDF, &(key, file_path), || {
                upload::upload_pdf(self.client.as_ref(), key, file_path)
            })
            .await
    }

    async fn process(&self, task: &ConversionTask) -> Result<(RenderedArtifact, UploadReport), ItemError> {
        let artifact = self.render_to_pdf(&task.parent_key, &task.source_link).await?;
        let report = self.upload_pdf(&artifact.key, &artifact.file_path).await?;
        Ok((artifact, report))
    }

    /// One full pass: discover, then render and upload each item in turn.
    ///
    /// Only a failure to list the library is fatal; every per-item failure
    /// is logged and returned as [`ItemOutcome::Failed`].
    pub async fn run_once(&self) -> Result<Vec<ItemOutcome>, SyncError> {
        let start = Instant::now();
        let discovered = self.discover_items().await.map_err(SyncError::Discovery)?;
        self.progress.on_run_start(discovered.len());

        let mut outcomes = Vec::with_capacity(discovered.len());
        for (item, task) in discovered {
            self.progress.on_item_start(&task.parent_key);
            let outcome = match self.process(&task).await {
                Ok((artifact, report)) => {
                    self.progress.on_item_complete(&task.parent_key, &artifact.file_path);
                    ItemOutcome::Uploaded {
                        task,
                        artifact,
                        report,
                    }
                }
                Err(e) => {
                    error!("{}", e);
                    error!("{:?}", item);
                    self.progress.on_item_error(&task.parent_key, &e.to_string());
                    ItemOutcome::Failed { task, error: e }
                }
            };
            outcomes.push(outcome);
        }

        let uploaded = outcomes.iter().filter(|o| o.is_uploaded()).count();
        self.progress.on_run_complete(outcomes.len(), uploaded);
        info!(
            "Run complete: {}/{} uploaded in {}ms",
            uploaded,
            outcomes.len(),
            start.elapsed().as_millis()
        );
        Ok(outcomes)
    }
}

fn remove_dir(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(SyncError::Cleanup {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}
