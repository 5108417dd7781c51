//! Content-addressed storage for binary assets.
//!
//! Each key (an image URL) maps to `<dir>/<hex sha256(key)>`. The first write
//! for a key wins; later puts for the same key are ignored until the blob is
//! removed. Entries carry no metadata and have no TTL: they leave together with
//! the article that referenced them.

mod prefetch;

pub use prefetch::{ImagePrefetcher, DEFAULT_PREFETCH_CONCURRENCY};

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::app::Result;

const PARTIAL_SUFFIX: &str = ".part";

pub struct BlobStore {
    dir: PathBuf,
    partial_seq: AtomicU64,
}

impl BlobStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            partial_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn digest(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::digest(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Store `bytes` under `key` unless a blob already exists.
    ///
    /// Returns whether this call wrote the blob. Data lands in a partial file
    /// first and is renamed into place, so readers never see a torn blob.
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let target = self.path_for(key);
        if target.exists() {
            return Ok(false);
        }

        let seq = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        let partial = self.dir.join(format!(
            "{}.{}.{}{}",
            Self::digest(key),
            std::process::id(),
            seq,
            PARTIAL_SUFFIX
        ));

        let mut file = fs::File::create(&partial)?;
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        drop(file);

        // Lost a race with another writer for the same key: keep theirs.
        if target.exists() {
            let _ = fs::remove_file(&partial);
            return Ok(false);
        }

        fs::rename(&partial, &target)?;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob for `key`. Absent blobs are not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file under the cache directory. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }

    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }
}
