//! HTML → PDF rendering through a headless Chrome/Chromium.
//!
//! The pipeline depends on the [`HtmlRenderer`] trait only; [`ChromeRenderer`]
//! is the production implementation. Chrome cannot read HTML from stdin, so
//! the text is written to a temporary `.html` file that lives until the
//! browser exits, then Chrome prints it with `--print-to-pdf`.

use crate::error::ItemError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Executable names searched on `PATH` when the configured path is unusable.
const CHROME_EXECUTABLES: [&str; 5] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Converts HTML text into a PDF file on disk.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Render `html` to a PDF at `output`, replacing any existing file.
    async fn render_html_to_file(&self, html: &str, output: &Path) -> Result<(), ItemError>;
}

/// Headless Chrome/Chromium renderer.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    executable: PathBuf,
    timeout: Duration,
}

impl ChromeRenderer {
    /// Use `configured` if it exists, otherwise search `PATH` for a browser.
    ///
    /// Falls back to `configured` unchanged when nothing is found so the
    /// failure surfaces on the first render with the configured path in the
    /// message.
    pub fn new(configured: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        let configured = configured.into();
        let executable = if configured.is_file() {
            configured
        } else if let Ok(found) = which::which(&configured) {
            found
        } else if let Some(found) = CHROME_EXECUTABLES.iter().find_map(|exe| which::which(exe).ok()) {
            warn!(
                "Chrome not found at '{}'; using '{}' from PATH",
                configured.display(),
                found.display()
            );
            found
        } else {
            warn!("Chrome not found at '{}' nor on PATH", configured.display());
            configured
        };
        Self {
            executable,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(file_url(input))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl HtmlRenderer for ChromeRenderer {
    #[instrument(skip(self, html), fields(bytes = html.len()))]
    async fn render_html_to_file(&self, html: &str, output: &Path) -> Result<(), ItemError> {
        let key = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut input = tempfile::Builder::new()
            .prefix("zotero-pdfsync-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| ItemError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;
        input.write_all(html.as_bytes()).map_err(|e| ItemError::Io {
            path: input.path().to_path_buf(),
            source: e,
        })?;

        // A stale PDF from an earlier run must not pass for this render's output.
        match tokio::fs::remove_file(output).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(ItemError::Io {
                    path: output.to_path_buf(),
                    source: e,
                })
            }
            _ => {}
        }

        debug!("Running {} for {}", self.executable.display(), key);
        let child = self.command(input.path(), output).spawn().map_err(|e| ItemError::Render {
            key: key.clone(),
            detail: format!("failed to start '{}': {e}", self.executable.display()),
        })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ItemError::RenderTimeout {
                key: key.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ItemError::Render {
                key: key.clone(),
                detail: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ItemError::Render {
                key,
                detail: format!("chrome exited with {}: {}", result.status, stderr.trim()),
            });
        }

        // Chrome exits 0 on some print failures; trust the file, not the code.
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                info!("Rendered {} ({} bytes)", output.display(), meta.len());
                Ok(())
            }
            _ => Err(ItemError::Render {
                key,
                detail: format!("no PDF written to '{}'", output.display()),
            }),
        }
    }
}

/// `file://` URL for a local absolute path.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
