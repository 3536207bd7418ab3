//! Configuration for a sync run.
//!
//! Everything the run needs is read once from a single TOML document with
//! two sections:
//!
//! ```toml
//! [zotero]
//! library_id = "1234567"
//! zotero_api_key = "..."
//! zotero_directory = "/home/me/Zotero"
//!
//! [system]
//! path_to_chrome_exe = "/usr/bin/google-chrome"
//! save_dir = "/tmp/zotero-converter"
//! ```
//!
//! A missing file, malformed TOML, or a missing required key is fatal: the
//! run aborts before any call to the library service. There is no partial
//! config.

use crate::error::SyncError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Default Zotero Web API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.zotero.org";

/// Kind of library the id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

impl LibraryType {
    /// URL path prefix used by the Web API (`users` or `groups`).
    pub fn path_segment(self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }
}

/// Top-level configuration document.
#[derive(Clone, Deserialize)]
pub struct Config {
    pub zotero: ZoteroConfig,
    pub system: SystemConfig,
}

/// `[zotero]` section: library credentials and connection info.
#[derive(Clone, Deserialize)]
pub struct ZoteroConfig {
    /// Numeric user or group id.
    pub library_id: String,

    #[serde(rename = "zotero_api_key")]
    pub api_key: String,

    /// Local Zotero data directory. Only the watch trigger looks at it.
    pub zotero_directory: PathBuf,

    #[serde(default)]
    pub library_type: LibraryType,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// `[system]` section: local paths and limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Chrome/Chromium executable used for rendering.
    #[serde(rename = "path_to_chrome_exe")]
    pub renderer_path: PathBuf,

    /// Working directory for generated PDFs.
    #[serde(rename = "save_dir")]
    pub work_dir: PathBuf,

    /// Directory for memoised call results. Lives outside `work_dir`.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Per-request timeout for library service calls. Default: 120.
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Upper bound on a single Chrome invocation. Default: 120.
    #[serde(default = "default_timeout_secs")]
    pub render_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// `~/.temp/.cache`, falling back to the system temp dir when there is no home.
fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".temp")
        .join(".cache")
}

fn default_timeout_secs() -> u64 {
    120
}

// The API key never reaches the logs.
impl fmt::Debug for ZoteroConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoteroConfig")
            .field("library_id", &self.library_id)
            .field("api_key", &"<redacted>")
            .field("zotero_directory", &self.zotero_directory)
            .field("library_type", &self.library_type)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("zotero", &self.zotero)
            .field("system", &self.system)
            .finish()
    }
}

impl Config {
    /// Load and validate the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                SyncError::ConfigRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            SyncError::ConfigParse { detail, .. } => SyncError::ConfigParse {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Parse and validate a config document held in memory.
    pub fn from_toml_str(content: &str) -> Result<Self, SyncError> {
        let config: Config = toml::from_str(content).map_err(|e| SyncError::ConfigParse {
            path: PathBuf::from("<memory>"),
            detail: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create a new builder for `Config`.
    pub fn builder(
        library_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                zotero: ZoteroConfig {
                    library_id: library_id.into(),
                    api_key: api_key.into(),
                    zotero_directory: PathBuf::new(),
                    library_type: LibraryType::default(),
                    api_base: default_api_base(),
                },
                system: SystemConfig {
                    renderer_path: PathBuf::from("google-chrome"),
                    work_dir: std::env::temp_dir().join("zotero-converter"),
                    cache_dir: default_cache_dir(),
                    http_timeout_secs: default_timeout_secs(),
                    render_timeout_secs: default_timeout_secs(),
                },
            },
        }
    }

    /// Reject values that parsed but cannot work.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.zotero.library_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("zotero.library_id is empty".into()));
        }
        if self.zotero.api_key.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "zotero.zotero_api_key is empty".into(),
            ));
        }
        if self.system.work_dir.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig("system.save_dir is empty".into()));
        }
        if self.system.http_timeout_secs == 0 || self.system.render_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "system.http_timeout_secs and system.render_timeout_secs must be at least 1".into(),
            ));
        }
        if self.system.cache_dir.starts_with(&self.system.work_dir) {
            return Err(SyncError::InvalidConfig(format!(
                "system.cache_dir '{}' must live outside system.save_dir '{}'",
                self.system.cache_dir.display(),
                self.system.work_dir.display()
            )));
        }
        Ok(())
    }

    /// Path the PDF for `key` is rendered to.
    pub fn output_path(&self, key: &str) -> PathBuf {
        self.system.work_dir.join(format!("generated_{key}.pdf"))
    }
}

/// Builder for [`Config`].
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn library_type(mut self, t: LibraryType) -> Self {
        self.config.zotero.library_type = t;
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.zotero.api_base = url.into();
        self
    }

    pub fn zotero_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.zotero.zotero_directory = dir.into();
        self
    }

    pub fn renderer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.system.renderer_path = path.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.system.work_dir = dir.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.system.cache_dir = dir.into();
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.system.http_timeout_secs = secs.max(1);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.system.render_timeout_secs = secs.max(1);
        self
    }

    /// Validate and return the final config.
    pub fn build(self) -> Result<Config, SyncError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
