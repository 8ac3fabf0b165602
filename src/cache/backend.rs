//! Persistence backends for the cache stores
//!
//! A backend stores opaque JSON blobs under a key, grouped by store. The file
//! backend writes one `<key>.json` file per entry under `raw-data/` and
//! `processed-data/`; the memory backend keeps the blobs in a map and is used
//! when persistence is not wanted.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{CacheError, CacheResult};

/// The two logical stores of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Raw,
    Processed,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw-data",
            Self::Processed => "processed-data",
        }
    }

    pub fn all() -> [StoreKind; 2] {
        [Self::Raw, Self::Processed]
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted blob as read back from a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Backend-side key, used to remove the blob again
    pub key: String,
    pub body: String,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read every blob of a store
    async fn load_all(&self, store: StoreKind) -> CacheResult<Vec<StoredBlob>>;

    /// Insert or overwrite a blob
    async fn write(&self, store: StoreKind, key: &str, body: &str) -> CacheResult<()>;

    /// Remove a blob; removing a missing key is not an error
    async fn remove(&self, store: StoreKind, key: &str) -> CacheResult<()>;

    /// Remove every blob of a store
    async fn clear(&self, store: StoreKind) -> CacheResult<()>;
}

/// File-per-entry backend rooted at a cache directory
#[derive(Debug, Clone)]
pub struct FileCacheBackend {
    base_dir: PathBuf,
}

impl FileCacheBackend {
    /// Open the backend, creating the store directories when missing
    pub async fn open(base_dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let base_dir = base_dir.into();
        for store in StoreKind::all() {
            fs::create_dir_all(base_dir.join(store.as_str()))
                .await
                .map_err(|e| {
                    CacheError::unavailable(format!(
                        "cannot create {}: {}",
                        base_dir.join(store.as_str()).display(),
                        e
                    ))
                })?;
        }
        debug!("Opened file cache at {}", base_dir.display());
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn store_dir(&self, store: StoreKind) -> PathBuf {
        self.base_dir.join(store.as_str())
    }

    fn entry_path(&self, store: StoreKind, key: &str) -> PathBuf {
        self.store_dir(store)
            .join(format!("{}.json", sanitize_key(key)))
    }
}

/// Keep keys safe to use as file names
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn load_all(&self, store: StoreKind) -> CacheResult<Vec<StoredBlob>> {
        let mut blobs = Vec::new();
        let mut entries = match fs::read_dir(self.store_dir(store)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(blobs),
            Err(e) => return Err(CacheError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let body = fs::read_to_string(&path).await?;
            blobs.push(StoredBlob {
                key: key.to_string(),
                body,
            });
        }

        blobs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(blobs)
    }

    async fn write(&self, store: StoreKind, key: &str, body: &str) -> CacheResult<()> {
        let path = self.entry_path(store, key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, store: StoreKind, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.entry_path(store, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    async fn clear(&self, store: StoreKind) -> CacheResult<()> {
        let dir = self.store_dir(store);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::Io(e)),
        }
        fs::create_dir_all(&dir).await?;
        Ok(())
    }
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    stores: RwLock<HashMap<StoreKind, BTreeMap<String, String>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, store: StoreKind) -> usize {
        self.stores
            .read()
            .await
            .get(&store)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn load_all(&self, store: StoreKind) -> CacheResult<Vec<StoredBlob>> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(&store)
            .map(|blobs| {
                blobs
                    .iter()
                    .map(|(key, body)| StoredBlob {
                        key: key.clone(),
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write(&self, store: StoreKind, key: &str, body: &str) -> CacheResult<()> {
        self.stores
            .write()
            .await
            .entry(store)
            .or_default()
            .insert(key.to_string(), body.to_string());
        Ok(())
    }

    async fn remove(&self, store: StoreKind, key: &str) -> CacheResult<()> {
        if let Some(blobs) = self.stores.write().await.get_mut(&store) {
            blobs.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, store: StoreKind) -> CacheResult<()> {
        self.stores.write().await.remove(&store);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_backend_roundtrip_and_layout() {
        let temp = TempDir::new().unwrap();
        let backend = FileCacheBackend::open(temp.path()).await.unwrap();

        backend
            .write(StoreKind::Raw, "2024-01-01", "[]")
            .await
            .unwrap();
        backend
            .write(StoreKind::Processed, "abc123", "{}")
            .await
            .unwrap();

        assert!(temp.path().join("raw-data/2024-01-01.json").exists());
        assert!(temp.path().join("processed-data/abc123.json").exists());

        let raw = backend.load_all(StoreKind::Raw).await.unwrap();
        assert_eq!(
            raw,
            vec![StoredBlob {
                key: "2024-01-01".into(),
                body: "[]".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_file_backend_survives_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let backend = FileCacheBackend::open(temp.path()).await.unwrap();
            backend.write(StoreKind::Processed, "k", "1").await.unwrap();
        }
        let reopened = FileCacheBackend::open(temp.path()).await.unwrap();
        assert_eq!(reopened.load_all(StoreKind::Processed).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_backend_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let backend = FileCacheBackend::open(temp.path()).await.unwrap();
        backend.write(StoreKind::Raw, "a", "1").await.unwrap();
        backend.write(StoreKind::Raw, "b", "2").await.unwrap();

        backend.remove(StoreKind::Raw, "a").await.unwrap();
        backend.remove(StoreKind::Raw, "missing").await.unwrap();
        assert_eq!(backend.load_all(StoreKind::Raw).await.unwrap().len(), 1);

        backend.clear(StoreKind::Raw).await.unwrap();
        assert!(backend.load_all(StoreKind::Raw).await.unwrap().is_empty());
        assert!(temp.path().join("raw-data").is_dir());
    }

    #[tokio::test]
    async fn test_file_backend_sanitizes_keys() {
        let temp = TempDir::new().unwrap();
        let backend = FileCacheBackend::open(temp.path()).await.unwrap();
        backend
            .write(StoreKind::Processed, "../escape", "{}")
            .await
            .unwrap();

        assert!(temp.path().join("processed-data/___escape.json").exists());
        assert!(!temp.path().join("escape.json").exists());
    }

    #[tokio::test]
    async fn test_file_backend_unavailable_when_path_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = FileCacheBackend::open(&blocker).await.unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryCacheBackend::new();
        backend.write(StoreKind::Processed, "k", "v").await.unwrap();
        backend.write(StoreKind::Processed, "k", "w").await.unwrap();
        assert_eq!(backend.len(StoreKind::Processed).await, 1);
        assert_eq!(backend.len(StoreKind::Raw).await, 0);

        let blobs = backend.load_all(StoreKind::Processed).await.unwrap();
        assert_eq!(blobs[0].body, "w");

        backend.clear(StoreKind::Processed).await.unwrap();
        assert_eq!(backend.len(StoreKind::Processed).await, 0);
    }
}
