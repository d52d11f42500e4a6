//! Disk Cache Module
//!
//! Persistent backend storing one file per key under a directory.
//!
//! # File layout
//! ```text
//! b"MEMO" | version: u8 | has_expiry: u8 | expires_at_ms: u64 BE | key_len: u32 BE | key | payload
//! ```
//! The payload is the value encoded by the cache's serializer. Files are
//! named by the SHA-256 of the key and replaced via write-then-rename, so a
//! reader (or a cancelled writer) sees either the old or the new entry.
//! Temp files left by an interrupted write are deleted on the next sweep.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::clock::{Clock, Timestamp};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::serializer::Serializer;

const MAGIC: &[u8; 4] = b"MEMO";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 1 + 8 + 4;
const ENTRY_EXTENSION: &str = "entry";
const TEMP_PREFIX: &str = "tmp-";

// == Record ==
/// A parsed entry file borrowing from the raw bytes.
#[derive(Debug)]
struct Record<'a> {
    expires_at: Option<Timestamp>,
    key: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Record<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::Corrupt("truncated header".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(CacheError::Corrupt("bad magic".to_string()));
        }
        if bytes[4] != VERSION {
            return Err(CacheError::Corrupt(format!("unknown version {}", bytes[4])));
        }

        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&bytes[6..14]);
        let expires_at = match bytes[5] {
            0 => None,
            1 => Some(Timestamp(u64::from_be_bytes(expiry))),
            flag => return Err(CacheError::Corrupt(format!("bad expiry flag {flag}"))),
        };

        let mut key_len = [0u8; 4];
        key_len.copy_from_slice(&bytes[14..18]);
        let key_end = HEADER_LEN + u32::from_be_bytes(key_len) as usize;
        if bytes.len() < key_end {
            return Err(CacheError::Corrupt("truncated key".to_string()));
        }

        Ok(Self {
            expires_at,
            key: &bytes[HEADER_LEN..key_end],
            payload: &bytes[key_end..],
        })
    }

    fn encode(key: &CacheKey, expires_at: Option<Timestamp>, payload: &[u8]) -> Result<Vec<u8>> {
        let key_len = u32::try_from(key.as_bytes().len())
            .map_err(|_| CacheError::Unserializable("key longer than 4 GiB".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + key.as_bytes().len() + payload.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        match expires_at {
            Some(at) => {
                out.push(1);
                out.extend_from_slice(&at.as_millis().to_be_bytes());
            }
            None => {
                out.push(0);
                out.extend_from_slice(&0u64.to_be_bytes());
            }
        }
        out.extend_from_slice(&key_len.to_be_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

// == Pending Write ==
/// Temp file that is deleted on drop unless renamed into place.
///
/// Covers a failed write as well as a `put` dropped between write and rename.
#[derive(Debug)]
struct PendingWrite {
    path: PathBuf,
    committed: bool,
}

impl PendingWrite {
    fn beside(target: &Path) -> Self {
        let suffix = format!("{TEMP_PREFIX}{:016x}", rand::random::<u64>());
        Self {
            path: target.with_extension(suffix),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed unfinished temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp file"),
        }
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.starts_with(TEMP_PREFIX))
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

// == Disk Cache ==
/// Directory-backed cache encoding values through `S`.
///
/// Use a clock that is stable across processes (such as `SystemClock`) if
/// the directory outlives the process.
#[derive(Debug)]
pub struct DiskCache<S> {
    dir: PathBuf,
    serializer: S,
    clock: Arc<dyn Clock>,
    /// Serializes mutations within this instance
    write_lock: Mutex<()>,
}

impl<S: Serializer> DiskCache<S> {
    // == Open ==
    /// Opens (creating if needed) a cache directory and sweeps expired entries.
    pub async fn open(dir: impl AsRef<Path>, serializer: S, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let cache = Self {
            dir,
            serializer,
            clock,
            write_lock: Mutex::new(()),
        };
        let removed = cache.sweep().await?;
        debug!(dir = %cache.dir.display(), removed, "Opened disk cache");
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the file holding `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{name}.{ENTRY_EXTENSION}"))
    }

    async fn paths_matching(&self, wanted: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if wanted(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        self.paths_matching(is_entry_file).await
    }

    /// Reads an entry file; a file vanishing mid-scan counts as absent.
    async fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // == Sweep ==
    /// Deletes expired entries and leftover temp files.
    ///
    /// Returns the number of expired entries removed. A temp file being
    /// written by another process sharing the directory is deleted too, which
    /// fails that process's `put` without touching its previous entry.
    async fn sweep(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut removed = 0;

        for path in self.paths_matching(is_temp_file).await? {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed leftover temp file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        for path in self.entry_paths().await? {
            let Some(bytes) = Self::read_file(&path).await? else {
                continue;
            };
            match Record::parse(&bytes) {
                Ok(record) if record.is_expired(now) => match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt cache file"),
            }
        }

        if removed > 0 {
            info!(dir = %self.dir.display(), removed, "Removed expired disk entries");
        }
        Ok(removed)
    }
}

#[async_trait]
impl<V, S> Cache<V> for DiskCache<S>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Serializer + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<V> {
        let now = self.clock.now();
        let bytes = Self::read_file(&self.path_for(key))
            .await?
            .ok_or(CacheError::NotFound)?;

        let record = Record::parse(&bytes)?;
        if record.key != key.as_bytes() {
            return Err(CacheError::Corrupt("stored key does not match".to_string()));
        }
        if record.is_expired(now) {
            return Err(CacheError::NotFound);
        }
        self.serializer.decode(record.payload)
    }

    // == Put ==
    /// Encodes before touching disk, so an unserializable value leaves the
    /// previous entry in place.
    async fn put(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> Result<()> {
        let payload = self.serializer.encode(&value)?;
        let path = self.path_for(&key);

        let _guard = self.write_lock.lock().await;
        let expires_at = ttl.map(|ttl| self.clock.now().after(ttl));
        let bytes = Record::encode(&key, expires_at, &payload)?;

        let pending = PendingWrite::beside(&path);
        fs::write(pending.path(), &bytes).await?;
        fs::rename(pending.path(), &path).await?;
        pending.commit();
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_expired(&self) -> Result<usize> {
        self.sweep().await
    }

    async fn entries(&self) -> Result<Vec<(CacheKey, V)>> {
        let now = self.clock.now();
        let mut entries = Vec::new();

        for path in self.entry_paths().await? {
            let Some(bytes) = Self::read_file(&path).await? else {
                continue;
            };
            let decoded = Record::parse(&bytes).and_then(|record| {
                if record.is_expired(now) {
                    return Ok(None);
                }
                let value: V = self.serializer.decode(record.payload)?;
                Ok(Some((CacheKey::from(record.key), value)))
            });
            match decoded {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt cache file"),
            }
        }
        Ok(entries)
    }
}
