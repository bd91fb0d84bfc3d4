//! Local persistent cache backend.
//!
//! Entries live as `<root>/<key>.json`. Each write goes to a temporary file in
//! `root` that is then renamed over the entry, so readers see whole entries
//! only. Every open backend holds a shared advisory lock on `<root>/.lock`;
//! [`CacheBackend::clear`] needs the lock exclusively.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;

use crate::cache::backend::{CacheBackend, CacheEntry};
use crate::cache::key::CacheKey;
use crate::error::{Error, Result};

/// Name of the lock file inside the cache root.
pub const LOCK_FILE: &str = ".lock";

const ENTRY_EXTENSION: &str = "json";

/// Backend storing one JSON file per entry under a root directory.
#[derive(Debug)]
pub struct DiskBackend {
    root: PathBuf,
    lock: Option<File>,
}

impl DiskBackend {
    /// Create `root` if needed and take a shared lock on it.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let lock_path = root.join(LOCK_FILE);
        let lock = blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_shared(&file)?;
            Ok(file)
        })
        .await?;

        log::debug!("opened disk cache at {}", root.display());
        Ok(Self {
            root,
            lock: Some(lock),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }

    fn lock_file(&self) -> Result<&File> {
        self.lock
            .as_ref()
            .ok_or_else(|| Error::CacheBackend(format!("{} is closed", self.root.display())))
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.lock_file()?;
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => CacheEntry::decode(key, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.lock_file()?;
        let bytes = serde_json::to_vec(entry)?;
        let root = self.root.clone();
        let path = self.entry_path(key);
        blocking(move || write_atomic(&root, &path, &bytes)).await
    }

    async fn clear(&self) -> Result<()> {
        let lock = self.lock_file()?.try_clone()?;
        let root = self.root.clone();

        let removed = blocking(move || {
            if let Err(e) = FileExt::try_lock_exclusive(&lock) {
                // a failed flock upgrade may drop the shared lock
                FileExt::lock_shared(&lock)?;
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("cache directory is in use by another handle: {}", e),
                ));
            }
            let result = remove_entries(&root);
            FileExt::lock_shared(&lock)?;
            result
        })
        .await?;

        log::info!("cleared {} entries from {}", removed, self.root.display());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(lock) = self.lock.take() {
            blocking(move || FileExt::unlock(&lock)).await?;
            log::debug!("closed disk cache at {}", self.root.display());
        }
        Ok(())
    }
}

fn write_atomic(root: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut temp_file = tempfile::Builder::new()
        .prefix(".entry")
        .suffix(".tmp")
        .tempfile_in(root)?;
    temp_file.write_all(contents)?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_entries(root: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for dir_entry in std::fs::read_dir(root)? {
        let path = dir_entry?.path();
        if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::CacheBackend(format!("disk cache task failed: {}", e)))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock => Error::CacheBackend(e.to_string()),
            _ => Error::Io(e),
        })
}
