//! Size-bounded LRU disk cache.
//!
//! Each entry is one file named by the SHA-256 of its key. The index (entry
//! size in access order) is an [`LruCache`] behind a mutex with a running
//! byte total, persisted to `journal.json` after every mutation. Writes go to
//! a `.part` file first and are renamed into place, so a crashed writer never
//! leaves a half-written entry under a live name.

use super::key::{safe_key, CacheKey};
use super::{DiskCache, Writer};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Index file inside the cache directory.
pub const JOURNAL_FILE: &str = "journal.json";

/// Suffix of in-progress writes.
pub const TEMP_SUFFIX: &str = ".part";

const JOURNAL_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    name: String,
    size: u64,
}

/// On-disk index. `entries` runs from least to most recently used.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
    version: u32,
    entries: Vec<JournalEntry>,
}

/// Entry name to file size, most recently used first.
#[derive(Debug)]
struct Index {
    lru: LruCache<String, u64>,
    bytes_in_use: u64,
}

impl Index {
    fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
            bytes_in_use: 0,
        }
    }

    /// Insert or replace an entry and mark it most recently used.
    fn insert(&mut self, name: String, size: u64) {
        self.bytes_in_use = self.bytes_in_use.saturating_add(size);
        if let Some((_, old)) = self.lru.push(name, size) {
            self.bytes_in_use = self.bytes_in_use.saturating_sub(old);
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        match self.lru.pop(name) {
            Some(size) => {
                self.bytes_in_use = self.bytes_in_use.saturating_sub(size);
                true
            }
            None => false,
        }
    }

    fn pop_lru(&mut self) -> Option<String> {
        let (name, size) = self.lru.pop_lru()?;
        self.bytes_in_use = self.bytes_in_use.saturating_sub(size);
        Some(name)
    }

    fn to_journal(&self) -> Journal {
        Journal {
            version: JOURNAL_VERSION,
            entries: self
                .lru
                .iter()
                .rev()
                .map(|(name, size)| JournalEntry {
                    name: name.clone(),
                    size: *size,
                })
                .collect(),
        }
    }
}

/// Disk cache bounded by total byte size with least-recently-used eviction.
pub struct DiskLruCache {
    directory: PathBuf,
    max_size: u64,
    index: Mutex<Index>,
    write_seq: AtomicU64,
}

fn is_entry_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

impl DiskLruCache {
    /// Open (or create) a cache in `directory`. Entries listed in the journal
    /// whose files are gone are dropped; stray `.part` files are deleted;
    /// entry files missing from the journal are adopted as least recently used.
    pub fn open(directory: &Path, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        let journal = read_journal(&directory.join(JOURNAL_FILE));

        let mut on_disk: HashMap<String, u64> = HashMap::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TEMP_SUFFIX) {
                tracing::debug!(file = %name, "removing stale partial cache write");
                let _ = fs::remove_file(entry.path());
                continue;
            }
            if !is_entry_name(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                on_disk.insert(name, meta.len());
            }
        }

        let journaled: HashSet<&str> = journal.entries.iter().map(|e| e.name.as_str()).collect();
        let mut adopted: Vec<(&String, &u64)> = on_disk
            .iter()
            .filter(|(name, _)| !journaled.contains(name.as_str()))
            .collect();
        adopted.sort();

        let mut index = Index::new();
        for (name, size) in adopted {
            index.insert(name.clone(), *size);
        }
        for entry in &journal.entries {
            if let Some(size) = on_disk.get(&entry.name) {
                index.insert(entry.name.clone(), *size);
            }
        }

        let cache = Self {
            directory: directory.to_path_buf(),
            max_size,
            index: Mutex::new(index),
            write_seq: AtomicU64::new(0),
        };
        {
            let mut index = cache.lock();
            cache.trim_to_size(&mut index);
            cache.persist(&index);
        }
        tracing::debug!(
            dir = %cache.directory.display(),
            entries = cache.len(),
            size = cache.size(),
            max_size,
            "opened disk cache"
        );
        Ok(cache)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Total bytes currently stored.
    pub fn size(&self) -> u64 {
        self.lock().bytes_in_use
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current access order to the journal.
    pub fn flush(&self) {
        let index = self.lock();
        self.persist(&index);
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn delete_file(&self, name: &str) {
        if let Err(e) = fs::remove_file(self.entry_path(name)) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(entry = name, error = %e, "failed to delete cache file");
            }
        }
    }

    fn remove_entry(&self, index: &mut Index, name: &str) {
        if index.remove(name) {
            self.delete_file(name);
        }
    }

    fn trim_to_size(&self, index: &mut Index) {
        while index.bytes_in_use > self.max_size {
            let Some(oldest) = index.pop_lru() else { break };
            tracing::debug!(entry = %oldest, "evicting least recently used cache entry");
            self.delete_file(&oldest);
        }
    }

    fn persist(&self, index: &Index) {
        if let Err(e) = write_journal(&self.directory.join(JOURNAL_FILE), &index.to_journal()) {
            tracing::warn!(dir = %self.directory.display(), error = %e, "failed to write cache journal");
        }
    }
}

fn read_journal(path: &Path) -> Journal {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Journal::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read cache journal");
            return Journal::default();
        }
    };
    match serde_json::from_slice::<Journal>(&data) {
        Ok(j) if j.version == JOURNAL_VERSION => j,
        Ok(j) => {
            tracing::warn!(version = j.version, "ignoring cache journal with unknown version");
            Journal::default()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache journal");
            Journal::default()
        }
    }
}

fn write_journal(path: &Path, journal: &Journal) -> io::Result<()> {
    let data = serde_json::to_vec_pretty(journal)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TEMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}

impl DiskCache for DiskLruCache {
    fn get(&self, key: &dyn CacheKey) -> Option<PathBuf> {
        let name = safe_key(key);
        let mut index = self.lock();
        if !index.lru.contains(&name) {
            return None;
        }
        let path = self.entry_path(&name);
        if !path.is_file() {
            tracing::debug!(entry = %name, "cache file vanished, dropping entry");
            self.remove_entry(&mut index, &name);
            return None;
        }
        index.lru.promote(&name);
        Some(path)
    }

    fn put(&self, key: &dyn CacheKey, writer: &mut dyn Writer) -> io::Result<()> {
        let name = safe_key(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .directory
            .join(format!("{name}.{seq}{TEMP_SUFFIX}"));

        if let Err(e) = writer.write(&temp) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        let size = match fs::metadata(&temp) {
            Ok(m) => m.len(),
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
        };

        let mut index = self.lock();
        if let Err(e) = fs::rename(&temp, self.entry_path(&name)) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        index.insert(name, size);
        self.trim_to_size(&mut index);
        self.persist(&index);
        Ok(())
    }

    fn delete(&self, key: &dyn CacheKey) {
        let name = safe_key(key);
        let mut index = self.lock();
        self.remove_entry(&mut index, &name);
        self.persist(&index);
    }

    fn clear(&self) {
        let mut index = self.lock();
        while let Some(name) = index.pop_lru() {
            self.delete_file(&name);
        }
        self.persist(&index);
    }
}
