//! Durable memoisation of expensive calls.
//!
//! [`MemoCache::get_or_compute`] runs an operation at most once per
//! `(identity, args)` pair and stores its successful result on disk, so a
//! later call (in this process or a later run) returns the stored value
//! without repeating the work. Failed operations are never stored.
//!
//! ## On-disk layout
//!
//! ```text
//! {cache_dir}/
//!   render_to_pdf-3f9a….json   { "identity": …, "args": …, "value": … }
//!   upload_pdf-81c0….json
//! ```
//!
//! The file name is the identity plus the SHA-256 of the canonical JSON
//! encoding of the arguments. Entries are written to a temp file and renamed
//! into place, so a crash mid-write leaves no half-written entry. There is no
//! expiry, no invalidation, and no locking between processes.

use crate::error::ItemError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A stored `(identity, args) → value` triple.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<V> {
    identity: String,
    args: serde_json::Value,
    value: V,
}

/// Persistent key-value store keyed by function identity and arguments.
#[derive(Debug, Clone)]
pub struct MemoCache {
    dir: PathBuf,
}

impl MemoCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ItemError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ItemError::Cache {
            path: dir.clone(),
            detail: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    /// Root directory of the cache.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return the stored result for `(identity, args)`, or run `op`, store
    /// its result, and return it.
    ///
    /// `op` is not invoked on a hit. If `op` fails the error is returned and
    /// nothing is stored. An entry that exists but cannot be read or decoded
    /// is logged and treated as a miss. If the result cannot be stored the
    /// call fails with [`ItemError::Cache`] even though `op` succeeded.
    pub async fn get_or_compute<A, T, F, Fut>(
        &self,
        identity: &str,
        args: &A,
        op: F,
    ) -> Result<T, ItemError>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ItemError>>,
    {
        let args = self.encode_args(args)?;
        let path = self.entry_path(identity, &args);

        if let Some(value) = self.read_entry::<T>(&path, identity, &args) {
            debug!("Cache hit: {identity} ({})", path.display());
            return Ok(value);
        }

        debug!("Cache miss: {identity}");
        let value = op().await?;
        self.write_entry(&path, identity, args, &value)?;
        Ok(value)
    }

    /// Whether a result for `(identity, args)` is already stored.
    pub fn contains<A: Serialize + ?Sized>(&self, identity: &str, args: &A) -> bool {
        match self.encode_args(args) {
            Ok(args) => self.entry_path(identity, &args).is_file(),
            Err(_) => false,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stored entry together with the cache directory.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn encode_args<A: Serialize + ?Sized>(&self, args: &A) -> Result<serde_json::Value, ItemError> {
        serde_json::to_value(args).map_err(|e| ItemError::Cache {
            path: self.dir.clone(),
            detail: format!("arguments not serialisable: {e}"),
        })
    }

    fn entry_path(&self, identity: &str, args: &serde_json::Value) -> PathBuf {
        // serde_json::Value orders object keys, so equal args hash equally.
        let digest = Sha256::new()
            .chain_update(identity.as_bytes())
            .chain_update([0u8])
            .chain_update(args.to_string().as_bytes())
            .finalize();
        self.dir.join(format!("{identity}-{digest:x}.json"))
    }

    fn read_entry<T: DeserializeOwned>(
        &self,
        path: &Path,
        identity: &str,
        args: &serde_json::Value,
    ) -> Option<T> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache entry {} is unreadable ({e}); recomputing", path.display());
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) if entry.identity == identity && &entry.args == args => Some(entry.value),
            Ok(_) => {
                warn!("Cache entry {} belongs to different arguments; recomputing", path.display());
                None
            }
            Err(e) => {
                warn!("Cache entry {} is unreadable ({e}); recomputing", path.display());
                None
            }
        }
    }

    fn write_entry<T: Serialize>(
        &self,
        path: &Path,
        identity: &str,
        args: serde_json::Value,
        value: &T,
    ) -> Result<(), ItemError> {
        let cache_err = |detail: String| ItemError::Cache {
            path: path.to_path_buf(),
            detail,
        };
        let entry = CacheEntry {
            identity: identity.to_string(),
            args,
            value,
        };
        let json = serde_json::to_vec_pretty(&entry).map_err(|e| cache_err(e.to_string()))?;

        // The directory may have been removed by a cleanup since `open`.
        std::fs::create_dir_all(&self.dir).map_err(|e| cache_err(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| cache_err(e.to_string()))?;
        tmp.write_all(&json).map_err(|e| cache_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| cache_err(e.error.to_string()))?;
        debug!("Cache stored: {identity} ({})", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (tempfile::TempDir, MemoCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemoCache::open(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn second_call_skips_computation() {
        let (_dir, cache) = cache();
        let calls = AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ItemError>(("ABCD".to_string(), 42u32))
        };
        let first = cache.get_or_compute("op", &("a", 1), compute).await.unwrap();
        let second = cache
            .get_or_compute("op", &("a", 1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ItemError>(("other".to_string(), 0u32))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn different_args_or_identity_compute_separately() {
        let (_dir, cache) = cache();
        let a: u32 = cache.get_or_compute("op", &"x", || async { Ok(1) }).await.unwrap();
        let b: u32 = cache.get_or_compute("op", &"y", || async { Ok(2) }).await.unwrap();
        let c: u32 = cache.get_or_compute("other", &"x", || async { Ok(3) }).await.unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn failures_are_not_stored() {
        let (_dir, cache) = cache();
        let err = cache
            .get_or_compute::<_, u32, _, _>("op", &"x", || async {
                Err(ItemError::Render {
                    key: "x".into(),
                    detail: "boom".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Render { .. }));
        assert!(!cache.contains("op", &"x"));

        let v: u32 = cache.get_or_compute("op", &"x", || async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
        assert!(cache.contains("op", &"x"));
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = MemoCache::open(dir.path()).unwrap();
        let _: String = first
            .get_or_compute("op", &["k"], || async { Ok("stored".to_string()) })
            .await
            .unwrap();
        drop(first);

        let reopened = MemoCache::open(dir.path()).unwrap();
        let calls = AtomicUsize::new(0);
        let v: String = reopened
            .get_or_compute("op", &["k"], || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("recomputed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(v, "stored");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_entry_is_recomputed() {
        let (_dir, cache) = cache();
        let _: u32 = cache.get_or_compute("op", &"x", || async { Ok(1) }).await.unwrap();
        let entry = std::fs::read_dir(cache.dir()).unwrap().next().unwrap().unwrap().path();
        std::fs::write(&entry, b"{not json").unwrap();

        let v: u32 = cache.get_or_compute("op", &"x", || async { Ok(2) }).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn clear_removes_directory() {
        let (_dir, cache) = cache();
        let _: u32 = cache.get_or_compute("op", &"x", || async { Ok(1) }).await.unwrap();
        cache.clear().unwrap();
        assert!(!cache.dir().exists());
        assert!(cache.is_empty());
        // Clearing twice is fine.
        cache.clear().unwrap();
    }

    #[tokio::test]
    async fn unwritable_cache_is_a_cache_error() {
        let (_dir, cache) = cache();
        // A plain file where the cache directory should be.
        std::fs::remove_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.dir(), b"not a directory").unwrap();

        let calls = AtomicUsize::new(0);
        let err = cache
            .get_or_compute("op", &"x", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ItemError>(1u32)
            })
            .await
            .unwrap_err();
        assert!(err.is_cache_error(), "got: {err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
