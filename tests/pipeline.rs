//! Integration tests for the sync pipeline against in-memory collaborators.
//!
//! `FakeLibrary` stands in for the Zotero Web API and `FakeRenderer` for
//! Chrome; both record every call so the tests can assert exactly what the
//! pipeline asked for. Each test gets its own temp work and cache dirs.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zotero_pdfsync::{
    run_with_trigger, ChannelTrigger, Config, ConversionTask, HtmlRenderer, ItemError, ItemOutcome,
    ItemQuery, LibraryClient, LibraryItem, RenderedArtifact, SyncPipeline, SyncProgressCallback,
    UploadReport,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

const API: &str = "https://api.zotero.org/users/1";

#[derive(Default)]
struct FakeLibrary {
    items: Vec<LibraryItem>,
    files: HashMap<String, Vec<u8>>,
    reject_uploads: bool,
    list_calls: AtomicUsize,
    fetches: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(Vec<PathBuf>, String)>>,
}

impl FakeLibrary {
    fn with_items(items: Vec<LibraryItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    fn file(mut self, id: &str, html: &str) -> Self {
        self.files.insert(id.to_string(), html.as_bytes().to_vec());
        self
    }

    fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    fn uploads(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl LibraryClient for FakeLibrary {
    async fn list_items(&self, query: &ItemQuery) -> Result<Vec<LibraryItem>, ItemError> {
        assert_eq!(query.item_type.as_deref(), Some("attachment"));
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, ItemError> {
        self.fetches.lock().unwrap().push(file_id.to_string());
        self.files.get(file_id).cloned().ok_or(ItemError::Service {
            operation: "fetch_file",
            status: Some(404),
            detail: format!("no file {file_id}"),
        })
    }

    async fn upload_attachment(
        &self,
        files: &[PathBuf],
        parent_key: &str,
    ) -> Result<UploadReport, ItemError> {
        self.uploads
            .lock()
            .unwrap()
            .push((files.to_vec(), parent_key.to_string()));
        let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        Ok(if self.reject_uploads {
            UploadReport {
                failure: names,
                ..Default::default()
            }
        } else {
            UploadReport {
                success: names,
                ..Default::default()
            }
        })
    }
}

/// Writes a tiny fake PDF; refuses any HTML containing `FAIL`.
#[derive(Default)]
struct FakeRenderer {
    renders: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeRenderer {
    fn renders(&self) -> Vec<(String, PathBuf)> {
        self.renders.lock().unwrap().clone()
    }
}

#[async_trait]
impl HtmlRenderer for FakeRenderer {
    async fn render_html_to_file(&self, html: &str, output: &Path) -> Result<(), ItemError> {
        self.renders
            .lock()
            .unwrap()
            .push((html.to_string(), output.to_path_buf()));
        if html.contains("FAIL") {
            return Err(ItemError::Render {
                key: output.display().to_string(),
                detail: "renderer reported failure".into(),
            });
        }
        std::fs::write(output, format!("%PDF-1.4 {html}")).map_err(|e| ItemError::Io {
            path: output.to_path_buf(),
            source: e,
        })
    }
}

fn html_attachment(key: &str, parent: &str) -> LibraryItem {
    serde_json::from_value(json!({
        "key": key,
        "version": 1,
        "links": {
            "self": {"href": format!("{API}/items/{key}"), "type": "application/json"},
            "attachment": {"href": format!("{API}/items/{key}/file"), "type": "text/html"}
        },
        "data": {
            "key": key,
            "itemType": "attachment",
            "linkMode": "imported_url",
            "contentType": "text/html",
            "parentItem": parent
        }
    }))
    .unwrap()
}

fn pdf_attachment(key: &str, parent: &str) -> LibraryItem {
    serde_json::from_value(json!({
        "key": key,
        "links": {
            "attachment": {"href": format!("{API}/items/{key}/file"), "type": "text/html"}
        },
        "data": {
            "itemType": "attachment",
            "contentType": "application/pdf",
            "parentItem": parent
        }
    }))
    .unwrap()
}

struct Harness {
    _dir: TempDir,
    work_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");
        let cache_dir = dir.path().join("cache");
        Self {
            _dir: dir,
            work_dir,
            cache_dir,
        }
    }

    fn config(&self) -> Config {
        Config::builder("1", "test-key")
            .work_dir(&self.work_dir)
            .cache_dir(&self.cache_dir)
            .build()
            .unwrap()
    }

    fn pipeline(&self, library: &Arc<FakeLibrary>, renderer: &Arc<FakeRenderer>) -> SyncPipeline {
        let pipeline = SyncPipeline::new(self.config(), library.clone(), renderer.clone()).unwrap();
        pipeline.create_work_dir().unwrap();
        pipeline
    }
}

// ── Discovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_scenario() {
    let h = Harness::new();
    let library = Arc::new(
        FakeLibrary::with_items(vec![html_attachment("XYZ", "ABCD")]).file("XYZ", "<html>hi</html>"),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let tasks = pipeline.discover_attachments().await.unwrap();
    assert_eq!(
        tasks,
        vec![ConversionTask {
            parent_key: "ABCD".into(),
            source_link: format!("{API}/items/XYZ"),
        }]
    );

    let artifact = pipeline
        .render_to_pdf(&tasks[0].parent_key, &tasks[0].source_link)
        .await
        .unwrap();
    let expected_path = h.work_dir.join("generated_ABCD.pdf");
    assert_eq!(
        artifact,
        RenderedArtifact {
            key: "ABCD".into(),
            file_path: expected_path.clone(),
        }
    );
    assert!(expected_path.is_file());
    assert_eq!(library.fetches(), vec!["XYZ".to_string()]);

    let outcomes = pipeline.run_once().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_uploaded());
    // Render was memoised by the direct call above; upload ran exactly once.
    assert_eq!(library.fetches().len(), 1);
    assert_eq!(renderer.renders().len(), 1);
    assert_eq!(library.uploads(), vec![(vec![expected_path], "ABCD".to_string())]);
}

#[tokio::test]
async fn discovery_keeps_only_html_with_html_link() {
    let h = Harness::new();
    let mut no_link = html_attachment("NOLINK", "P3");
    no_link.links.retain(|name, _| name == "self");
    let mut orphan = html_attachment("ORPHAN", "x");
    orphan.data.parent_item = None;

    let library = Arc::new(FakeLibrary::with_items(vec![
        html_attachment("H1", "P1"),
        pdf_attachment("PDF1", "P2"),
        no_link,
        orphan,
        html_attachment("H2", "P4"),
    ]));
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let tasks = pipeline.discover_attachments().await.unwrap();
    let parents: Vec<&str> = tasks.iter().map(|t| t.parent_key.as_str()).collect();
    assert_eq!(parents, vec!["P1", "P4"]);
    assert!(tasks.iter().all(|t| !t.source_link.ends_with("/file")));
}

#[tokio::test]
async fn non_html_attachments_are_never_converted() {
    let h = Harness::new();
    let library = Arc::new(FakeLibrary::with_items(vec![pdf_attachment("PDF1", "P1")]));
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    assert!(pipeline.discover_attachments().await.unwrap().is_empty());
    assert!(pipeline.run_once().await.unwrap().is_empty());
    assert!(library.fetches().is_empty());
    assert!(renderer.renders().is_empty());
    assert!(library.uploads().is_empty());
}

#[tokio::test]
async fn discovery_is_reinvocable() {
    let h = Harness::new();
    let library = Arc::new(FakeLibrary::with_items(vec![html_attachment("H1", "P1")]));
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let first = pipeline.discover_attachments().await.unwrap();
    let second = pipeline.discover_attachments().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(library.list_calls.load(Ordering::SeqCst), 2);
}

// ── Driver ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_item_does_not_stop_the_batch() {
    let h = Harness::new();
    // "A" has no stored file → fetch fails with 404.
    let library = Arc::new(
        FakeLibrary::with_items(vec![html_attachment("A", "PA"), html_attachment("B", "PB")])
            .file("B", "<p>b</p>"),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let outcomes = pipeline.run_once().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    match &outcomes[0] {
        ItemOutcome::Failed { task, error } => {
            assert_eq!(task.parent_key, "PA");
            assert!(matches!(error, ItemError::Service { status: Some(404), .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(outcomes[1].is_uploaded());
    assert_eq!(
        library.uploads(),
        vec![(vec![h.work_dir.join("generated_PB.pdf")], "PB".to_string())]
    );
}

#[tokio::test]
async fn render_failure_skips_upload() {
    let h = Harness::new();
    let library = Arc::new(
        FakeLibrary::with_items(vec![html_attachment("X", "P")]).file("X", "<p>FAIL</p>"),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let outcomes = pipeline.run_once().await.unwrap();
    assert!(matches!(
        &outcomes[0],
        ItemOutcome::Failed { error: ItemError::Render { .. }, .. }
    ));
    assert!(library.uploads().is_empty());
}

#[tokio::test]
async fn rejected_upload_is_a_failure_and_retried() {
    let h = Harness::new();
    let renderer = Arc::new(FakeRenderer::default());
    let rejecting = Arc::new(FakeLibrary {
        reject_uploads: true,
        ..FakeLibrary::with_items(vec![html_attachment("X", "P")]).file("X", "<p>x</p>")
    });

    let outcomes = h.pipeline(&rejecting, &renderer).run_once().await.unwrap();
    assert!(matches!(
        &outcomes[0],
        ItemOutcome::Failed { error: ItemError::UploadRejected { .. }, .. }
    ));

    // Next run: render is memoised, upload is attempted again.
    let accepting = Arc::new(FakeLibrary::with_items(vec![html_attachment("X", "P")]).file("X", "<p>x</p>"));
    let outcomes = h.pipeline(&accepting, &renderer).run_once().await.unwrap();
    assert!(outcomes[0].is_uploaded());
    assert_eq!(renderer.renders().len(), 1);
    assert!(accepting.fetches().is_empty());
    assert_eq!(accepting.uploads().len(), 1);
}

// ── Memoisation across runs ──────────────────────────────────────────────────

#[tokio::test]
async fn second_run_repeats_no_work() {
    let h = Harness::new();
    let library = Arc::new(
        FakeLibrary::with_items(vec![html_attachment("X", "P"), html_attachment("Y", "Q")])
            .file("X", "<p>x</p>")
            .file("Y", "<p>y</p>"),
    );
    let renderer = Arc::new(FakeRenderer::default());

    let first = h.pipeline(&library, &renderer).run_once().await.unwrap();
    assert!(first.iter().all(ItemOutcome::is_uploaded));

    // A fresh pipeline on the same cache directory behaves like a new process.
    let second = h.pipeline(&library, &renderer).run_once().await.unwrap();
    assert!(second.iter().all(ItemOutcome::is_uploaded));

    assert_eq!(library.fetches().len(), 2);
    assert_eq!(renderer.renders().len(), 2);
    assert_eq!(library.uploads().len(), 2);
}

#[tokio::test]
async fn failed_render_is_retried_on_next_run() {
    let h = Harness::new();
    let renderer = Arc::new(FakeRenderer::default());
    let missing = Arc::new(FakeLibrary::with_items(vec![html_attachment("X", "P")]));
    let outcomes = h.pipeline(&missing, &renderer).run_once().await.unwrap();
    assert!(!outcomes[0].is_uploaded());

    let present = Arc::new(FakeLibrary::with_items(vec![html_attachment("X", "P")]).file("X", "<p>x</p>"));
    let outcomes = h.pipeline(&present, &renderer).run_once().await.unwrap();
    assert!(outcomes[0].is_uploaded());
    assert_eq!(present.fetches(), vec!["X".to_string()]);
}

#[tokio::test]
async fn cleanup_removes_pdfs_and_cache() {
    let h = Harness::new();
    let library = Arc::new(FakeLibrary::with_items(vec![html_attachment("X", "P")]).file("X", "<p>x</p>"));
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);
    pipeline.run_once().await.unwrap();
    assert!(!pipeline.cache().is_empty());

    pipeline.cleanup().unwrap();
    assert!(!h.work_dir.exists());
    assert!(!h.cache_dir.exists());
}

// ── Progress & trigger ───────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    completes: AtomicUsize,
    errors: AtomicUsize,
    summary: Mutex<Option<(usize, usize)>>,
}

impl SyncProgressCallback for Counting {
    fn on_item_complete(&self, _key: &str, _pdf: &Path) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_error(&self, _key: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        *self.summary.lock().unwrap() = Some((total_items, success_count));
    }
}

#[tokio::test]
async fn progress_events_follow_outcomes() {
    let h = Harness::new();
    let library = Arc::new(
        FakeLibrary::with_items(vec![html_attachment("A", "PA"), html_attachment("B", "PB")])
            .file("B", "<p>b</p>"),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let counting = Arc::new(Counting::default());
    let pipeline = h.pipeline(&library, &renderer).with_progress(counting.clone());

    pipeline.run_once().await.unwrap();
    assert_eq!(counting.completes.load(Ordering::SeqCst), 1);
    assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    assert_eq!(*counting.summary.lock().unwrap(), Some((2, 1)));
}

#[tokio::test]
async fn without_trigger_runs_once() {
    let h = Harness::new();
    let library = Arc::new(FakeLibrary::default());
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let passes = run_with_trigger(&pipeline, None).await.unwrap();
    assert_eq!(passes, 1);
    assert_eq!(library.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trigger_events_rerun_discovery() {
    let h = Harness::new();
    let library = Arc::new(FakeLibrary::default());
    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = h.pipeline(&library, &renderer);

    let (tx, mut trigger) = ChannelTrigger::new(4);
    tx.send(()).await.unwrap();
    drop(tx);

    let passes = run_with_trigger(&pipeline, Some(&mut trigger)).await.unwrap();
    assert_eq!(passes, 2);
    assert_eq!(library.list_calls.load(Ordering::SeqCst), 2);
}
