//! Node cache
//!
//! A bounded set of decoded node buffers keyed by file path. Replacement is
//! least-recently-used through per-entry age counters: every access ages all
//! entries by one and resets the touched entry, and a miss at capacity evicts
//! the oldest entry. Finding the victim is a linear scan, which is cheap for
//! the handful of entries a reader keeps.
//!
//! Dirty buffers are written back to their own file on eviction, on
//! [`NodeCache::flush_all`] and when the cache is dropped. A node is written
//! back with exactly the number of pixels it was loaded with, so short last
//! nodes never grow.

use crate::error::{IoContext, Result, StoreError};
use crate::pixel::{Pixel, decode_into, encode_slice};
use ahash::AHashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Handle to a resident node, valid until the next [`NodeCache::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle(usize);

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct CacheStats {
    /// Lookups served from a resident entry
    pub hits: u64,
    /// Lookups that loaded a file
    pub misses: u64,
    /// Entries replaced at capacity
    pub evictions: u64,
    /// Dirty buffers written back to disk
    pub write_backs: u64,
}

impl CacheStats {
    /// Fraction of lookups served without I/O
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry<P> {
    path: PathBuf,
    /// Exactly the pixels present on disk
    buffer: Vec<P>,
    dirty: bool,
    age: u64,
}

/// Bounded cache of node buffers
#[derive(Debug)]
pub struct NodeCache<P: Pixel> {
    capacity: usize,
    node_len: usize,
    entries: Vec<CacheEntry<P>>,
    lookup: AHashMap<PathBuf, usize>,
    stats: CacheStats,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl<P: Pixel> NodeCache<P> {
    /// Create a cache of `capacity` nodes of at most `node_len` pixels each
    pub fn new(capacity: usize, node_len: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StoreError::InvalidParameter(
                "node cache capacity must be at least 1".to_string(),
            ));
        }
        if node_len == 0 {
            return Err(StoreError::InvalidParameter("node length must be at least 1".to_string()));
        }
        Ok(Self {
            capacity,
            node_len,
            entries: Vec::with_capacity(capacity),
            lookup: AHashMap::with_capacity(capacity),
            stats: CacheStats::default(),
            read_buf: Vec::new(),
            write_buf: Vec::new(),
        })
    }

    /// Make the node at `path` resident and return its handle
    ///
    /// On a load failure nothing is evicted and the cache is unchanged.
    pub fn put(&mut self, path: &Path) -> Result<SlotHandle> {
        if let Some(&slot) = self.lookup.get(path) {
            self.stats.hits += 1;
            self.touch(slot);
            return Ok(SlotHandle(slot));
        }

        // load before evicting so a bad path costs nothing
        self.read_node(path)?;
        self.stats.misses += 1;

        let slot = if self.entries.len() < self.capacity {
            self.entries.push(CacheEntry {
                path: path.to_path_buf(),
                buffer: Vec::new(),
                dirty: false,
                age: 0,
            });
            self.entries.len() - 1
        } else {
            let victim = self.oldest();
            self.write_back(victim)?;
            let old = std::mem::replace(&mut self.entries[victim].path, path.to_path_buf());
            log::debug!("evicting node {} for {}", old.display(), path.display());
            self.lookup.remove(&old);
            self.stats.evictions += 1;
            victim
        };

        let entry = &mut self.entries[slot];
        entry.buffer.clear();
        entry.buffer.resize(self.read_buf.len() / P::SIZE, P::default());
        decode_into(&self.read_buf, &mut entry.buffer);
        entry.dirty = false;
        self.lookup.insert(path.to_path_buf(), slot);
        self.touch(slot);
        Ok(SlotHandle(slot))
    }

    /// Pixels of a resident node
    pub fn read(&self, handle: SlotHandle) -> &[P] {
        &self.entries[handle.0].buffer
    }

    /// Mutable pixels of a resident node; marks it dirty
    pub fn write(&mut self, handle: SlotHandle) -> &mut [P] {
        let entry = &mut self.entries[handle.0];
        entry.dirty = true;
        &mut entry.buffer
    }

    /// Write every dirty node back to disk
    pub fn flush_all(&mut self) -> Result<()> {
        for slot in 0..self.entries.len() {
            self.write_back(slot)?;
        }
        Ok(())
    }

    /// Whether the node at `path` is resident
    pub fn contains(&self, path: &Path) -> bool {
        self.lookup.contains_key(path)
    }

    /// Maximum number of resident nodes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident nodes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no node is resident
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters since creation
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn touch(&mut self, slot: usize) {
        for entry in &mut self.entries {
            entry.age += 1;
        }
        self.entries[slot].age = 0;
    }

    fn oldest(&self) -> usize {
        let mut victim = 0;
        for (slot, entry) in self.entries.iter().enumerate() {
            if entry.age > self.entries[victim].age {
                victim = slot;
            }
        }
        victim
    }

    fn read_node(&mut self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::open(path).at_path(path)?;
        self.read_buf.clear();
        file.read_to_end(&mut self.read_buf).at_path(path)?;
        let max_bytes = self.node_len * P::SIZE;
        if self.read_buf.len() > max_bytes {
            return Err(StoreError::Format(format!(
                "node {} holds {} bytes, more than {}",
                path.display(),
                self.read_buf.len(),
                max_bytes
            )));
        }
        Ok(())
    }

    fn write_back(&mut self, slot: usize) -> Result<()> {
        let entry = &mut self.entries[slot];
        if !entry.dirty {
            return Ok(());
        }
        self.write_buf.clear();
        encode_slice(&entry.buffer, &mut self.write_buf);
        std::fs::write(&entry.path, &self.write_buf).at_path(&entry.path)?;
        entry.dirty = false;
        self.stats.write_backs += 1;
        Ok(())
    }
}

impl<P: Pixel> Drop for NodeCache<P> {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            log::error!("failed to flush node cache on drop: {}", e);
        }
    }
}
