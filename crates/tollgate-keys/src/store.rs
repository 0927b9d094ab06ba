//! JSON key file.
//!
//! ```json
//! { "keys": { "<sha256 of key>": { "name": "...", "created_at": "...",
//!   "last_used_at": null, "enabled": true, "key_suffix": "ab12" } } }
//! ```
//!
//! Lookups re-read the file every time so that administrative changes made
//! by another process apply to the very next request. Every
//! read-modify-write holds an exclusive advisory lock on `<file>.lock` and
//! replaces the file atomically.

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tollgate_core::{ApiKey, CallerIdentity, CoreError, CoreResult, KeyRecord, KeyStore};
use tracing::{debug, warn};

use crate::error::{KeyStoreError, KeyStoreResult};

/// On-disk layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyFile {
    #[serde(default)]
    pub(crate) keys: BTreeMap<String, KeyRecord>,
}

/// Holds the advisory lock for the duration of a mutation.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> KeyStoreResult<Self> {
        let lock_path = lock_path_for(path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, &e))?;
        file.lock_exclusive().map_err(|e| io_error(&lock_path, &e))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn io_error(path: &Path, err: &std::io::Error) -> KeyStoreError {
    KeyStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn parse(path: &Path, bytes: &[u8]) -> KeyStoreResult<KeyFile> {
    serde_json::from_slice(bytes).map_err(|e| KeyStoreError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// File-backed [`KeyStore`].
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
    /// Keeps concurrent last-used updates from piling up blocking threads;
    /// cross-process exclusion comes from the file lock.
    writes: Arc<Mutex<()>>,
}

impl FileKeyStore {
    /// Store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the key file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the key file. A missing file is an empty store.
    pub(crate) fn load(&self) -> KeyStoreResult<KeyFile> {
        match std::fs::read(&self.path) {
            Ok(bytes) => parse(&self.path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KeyFile::default()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn load_async(&self) -> KeyStoreResult<KeyFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => parse(&self.path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KeyFile::default()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    fn save(&self, file: &KeyFile) -> KeyStoreResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| io_error(dir, &e))?;

        let body = serde_json::to_vec_pretty(file).map_err(|e| KeyStoreError::Io {
            path: self.path.clone(),
            message: format!("failed to serialize key file: {e}"),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, &e))?;
        tmp.write_all(&body).map_err(|e| io_error(tmp.path(), &e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| io_error(&self.path, &e))?;
        tmp.persist(&self.path).map_err(|e| io_error(&self.path, &e.error))?;
        Ok(())
    }

    /// Locked read-modify-write. `f` returns whether it changed anything and
    /// the file is only rewritten if it did.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut KeyFile) -> KeyStoreResult<(T, bool)>,
    ) -> KeyStoreResult<T> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut file = self.load()?;
        let (out, changed) = f(&mut file)?;
        if changed {
            self.save(&file)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn lookup(&self, key: &ApiKey) -> CoreResult<Option<CallerIdentity>> {
        let file = self.load_async().await.map_err(|e| {
            warn!(error = %e, "failed to read key file");
            CoreError::from(e)
        })?;
        Ok(file.keys.get(&key.digest()).map(KeyRecord::identity))
    }

    async fn touch_last_used(&self, key: &ApiKey) -> CoreResult<()> {
        let _guard = self.writes.lock().await;
        let store = self.clone();
        let digest = key.digest();
        tokio::task::spawn_blocking(move || {
            store.mutate(|file| {
                Ok(match file.keys.get_mut(&digest) {
                    Some(record) => {
                        record.last_used_at = Some(Utc::now());
                        ((), true)
                    },
                    None => ((), false),
                })
            })
        })
        .await
        .map_err(|e| CoreError::KeyStore(format!("last-used update task failed: {e}")))??;
        debug!("updated key last-used timestamp");
        Ok(())
    }
}
