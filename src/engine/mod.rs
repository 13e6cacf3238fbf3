//! # Storage Engine
//!
//! This module implements the synchronous, single-threaded [`Store`]: the
//! public entry point of the crate.
//!
//! ## Design Overview
//!
//! Data flows through three layers, consulted newest-first:
//!
//! 1. **Memtable** — an in-memory ordered write buffer (see [`crate::memtable`]).
//! 2. **Level 0 SSTs** — may overlap in key range; produced directly by
//!    flushing the memtable.
//! 3. **Level ≥ 1 SSTs** — pairwise disjoint in key range within a level;
//!    produced by compacting a level down into the next.
//!
//! Writes enter the memtable. When the memtable would exceed its byte
//! budget, it is serialized whole into a new level-0 SST
//! ([`Store::flush`]), after which [`compaction`](crate::compaction) runs
//! inline, on the same caller thread, to restore the per-level invariants
//! before the write that triggered the flush is applied.
//!
//! ## Concurrency Model
//!
//! The store is **not** internally synchronized. All operations run on one
//! caller thread; flush and compaction are synchronous, so when a `put`
//! call returns, every level invariant already holds. There is no
//! background thread and no WAL — an unflushed memtable is lost on an
//! unclean process exit. See the crate-level docs for the full contract.
//!
//! ## Guarantees
//!
//! - **Read-your-writes:** a `put` that returns is visible to the next
//!   `get`/`scan` on the same store.
//! - **Level bounds:** after every returned public call, level `L` holds at
//!   most `2^(L+1)` SSTs.
//! - **Graceful shutdown:** [`Store`] flushes a non-empty memtable on
//!   `Drop`, without running compaction (permitted by the source's own
//!   shutdown behavior).

#[cfg(test)]
mod tests;

mod scan;

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::memtable::{Memtable, TOMBSTONE};
use crate::sstable::builder::SstBuilder;
use crate::sstable::{self, SstError, SstHeader};

/// Byte budget shared by every SST (including its header); see
/// [`crate::sstable::MAX_SST_SIZE`].
const MAX_SST_SIZE: u64 = sstable::MAX_SST_SIZE;
/// `32 + 10240`: the fixed header + bloom filter overhead counted against
/// the flush predicate.
const FIXED_SST_OVERHEAD: u64 = sstable::HEADER_LEN + sstable::bloom::BLOOM_BYTES as u64;

/// Errors surfaced by [`Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading or writing an SST.
    #[error("SSTable error: {0}")]
    Sstable(#[from] SstError),
}

/// Configuration for opening a [`Store`]. Intentionally small: the on-disk
/// format and size bounds are fixed by the format itself, not tunable.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory under which `level-0/`, `level-1/`, … live.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// The per-level bound: level `L` may hold at most `2^(L+1)` SSTs.
pub(crate) fn level_bound(level: usize) -> usize {
    1usize << (level + 1)
}

/// A persistent, ordered key-value store.
///
/// See the module-level docs for the concurrency and durability contract.
/// Cloning is intentionally not supported — a `Store` owns exclusive
/// knowledge of its on-disk state.
pub struct Store {
    root: PathBuf,
    memtable: Memtable,
    /// `levels[l]` holds the resident headers for level `l`. Always sized
    /// to exactly `total_level + 1` (empty when `total_level < 0`).
    levels: Vec<Vec<SstHeader>>,
    total_level: i64,
    next_timestamp: u64,
}

impl Store {
    /// Opens (or creates) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_config(StoreConfig { root: root.into() })
    }

    /// Opens (or creates) a store per `config`.
    ///
    /// Scans `<root>/level-0/`, `<root>/level-1/`, … while the directory
    /// exists, loading every `*.sst` header into the resident cache.
    /// Corrupt SSTs are rejected and skipped (logged), not fatal to the
    /// whole open. `total_level` becomes the highest level directory
    /// found; the timestamp counter resumes one past the maximum
    /// timestamp observed across every loaded header.
    pub fn open_with_config(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root)?;

        let mut levels: Vec<Vec<SstHeader>> = Vec::new();
        let mut max_timestamp: u64 = 0;
        let mut any_loaded = false;

        let mut level = 0usize;
        loop {
            let dir = config.root.join(format!("level-{level}"));
            if !dir.is_dir() {
                break;
            }

            let mut headers = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("sst") {
                    continue;
                }
                match SstHeader::load(&path) {
                    Ok(header) => {
                        max_timestamp = max_timestamp.max(header.timestamp());
                        any_loaded = true;
                        headers.push(header);
                    }
                    Err(err) => {
                        warn!(?path, %err, "skipping corrupt SST at open");
                    }
                }
            }
            levels.push(headers);
            level += 1;
        }

        let total_level = levels.len() as i64 - 1;
        let next_timestamp = if any_loaded { max_timestamp + 1 } else { 0 };

        info!(
            root = %config.root.display(),
            total_level,
            next_timestamp,
            "store opened"
        );

        Ok(Self {
            root: config.root,
            memtable: Memtable::new(),
            levels,
            total_level,
            next_timestamp,
        })
    }

    fn level_dir(&self, level: usize) -> PathBuf {
        self.root.join(format!("level-{level}"))
    }

    /// Ensures `self.levels` has an entry for `level`, extending
    /// `total_level` if this grows the tree, and creates the level's
    /// directory on disk unconditionally — `total_level` must never claim
    /// a level whose directory does not exist, since directory absence is
    /// what `Store::open_with_config`'s scan uses to determine a level is
    /// not present.
    fn ensure_level(&mut self, level: usize) -> Result<(), StoreError> {
        while self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        if level as i64 > self.total_level {
            self.total_level = level as i64;
        }
        fs::create_dir_all(self.level_dir(level))?;
        Ok(())
    }

    /// Byte count the memtable would report immediately after applying
    /// `put(key, value)`, per the flush predicate in the crate's design
    /// notes.
    fn prospective_bytes(&self, key: u64, new_len: usize) -> i64 {
        let bytes = self.memtable.bytes() as i64;
        let delta = match self.memtable.search(key) {
            Some(old) => new_len as i64 - old.len() as i64,
            None => 12 + new_len as i64,
        };
        bytes + delta
    }

    /// Inserts or updates `key`. Always succeeds (barring I/O failure
    /// during a triggered flush).
    pub fn put(&mut self, key: u64, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        let value = value.into();
        let nxt = self.prospective_bytes(key, value.len());
        if nxt + FIXED_SST_OVERHEAD as i64 > MAX_SST_SIZE as i64 {
            self.flush(true)?;
        }
        self.memtable.insert(key, value);
        Ok(())
    }

    /// Point lookup. Returns an empty `Vec` for "not found" and for a
    /// tombstoned key — never an error for absence.
    pub fn get(&mut self, key: u64) -> Result<Vec<u8>, StoreError> {
        if let Some(value) = self.memtable.search(key) {
            return Ok(resolve_tombstone(value.to_vec()));
        }

        for level in &self.levels {
            let mut best: Option<(&SstHeader, u32, u32)> = None;
            for header in level {
                if key < header.min_key() || key > header.max_key() {
                    continue;
                }
                if let Some((offset, len)) = header.search_offset(key) {
                    let take = match &best {
                        None => true,
                        Some((b, _, _)) => header.timestamp() > b.timestamp(),
                    };
                    if take {
                        best = Some((header, offset, len));
                    }
                }
                // A range-hit with an index-miss is handled uniformly here:
                // level 0 SSTs may overlap, so the loop simply continues to
                // the next sibling; level >= 1 SSTs are disjoint, so no
                // other header in this level can match `key` either way.
            }
            if let Some((header, offset, len)) = best {
                let value = header.fetch_value(offset, len)?;
                return Ok(resolve_tombstone(value));
            }
        }

        Ok(Vec::new())
    }

    /// Deletes `key` if live. Returns `false`, writing nothing, if the key
    /// is not currently live.
    pub fn delete(&mut self, key: u64) -> Result<bool, StoreError> {
        let current = self.get(key)?;
        if current.is_empty() {
            return Ok(false);
        }
        self.put(key, TOMBSTONE.to_vec())?;
        Ok(true)
    }

    /// Appends every live `(key, value)` with `k1 <= key <= k2` to `out`,
    /// ascending by key, deduplicated to the newest source per key.
    pub fn scan(&mut self, k1: u64, k2: u64, out: &mut Vec<(u64, Vec<u8>)>) -> Result<(), StoreError> {
        scan::range_scan(&self.memtable, &self.levels, k1, k2, out)
    }

    /// Empties the memtable, removes every level directory from disk, and
    /// clears the header cache — equivalent to a fresh store at the same
    /// root directory.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.memtable.reset();
        for level in &self.levels {
            for header in level {
                sstable::unlink(header.path());
            }
        }
        for level in 0..self.levels.len() {
            let dir = self.level_dir(level);
            if dir.is_dir() {
                if let Err(err) = fs::remove_dir(&dir) {
                    warn!(?dir, %err, "failed to remove level directory during reset");
                }
            }
        }
        self.levels.clear();
        self.total_level = -1;
        self.next_timestamp = 0;
        info!(root = %self.root.display(), "store reset");
        Ok(())
    }

    /// Serializes the current memtable to a new level-0 SST, registers its
    /// header, resets the memtable, and (if `run_compaction`) restores the
    /// per-level invariants. Creates `level-0/` on demand.
    fn flush(&mut self, run_compaction: bool) -> Result<(), StoreError> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;

        let mut builder = SstBuilder::new();
        for (key, value) in self.memtable.iter() {
            builder.push(key, value.to_vec());
        }

        self.ensure_level(0)?;
        let dir = self.level_dir(0);
        if let Some(header) = builder.seal(timestamp, &dir)? {
            debug!(path = ?header.path(), count = header.count(), "flushed memtable to level-0 SST");
            self.levels[0].push(header);
        }
        self.memtable.reset();

        if run_compaction {
            crate::compaction::compact(self)?;
        }

        Ok(())
    }

    /// Forces a flush (and compaction) regardless of the byte-budget
    /// predicate. Used by tests and benchmarks that need a deterministic
    /// level-0 SST without writing up to the byte budget.
    pub fn force_flush(&mut self) -> Result<(), StoreError> {
        self.flush(true)
    }

    pub(crate) fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub(crate) fn total_level(&self) -> i64 {
        self.total_level
    }

    pub(crate) fn levels(&self) -> &[Vec<SstHeader>] {
        &self.levels
    }

    pub(crate) fn levels_mut(&mut self) -> &mut Vec<Vec<SstHeader>> {
        &mut self.levels
    }

    pub(crate) fn take_next_timestamp(&mut self) -> u64 {
        let ts = self.next_timestamp;
        self.next_timestamp += 1;
        ts
    }

    pub(crate) fn level_path(&self, level: usize) -> PathBuf {
        self.level_dir(level)
    }

    pub(crate) fn ensure_level_pub(&mut self, level: usize) -> Result<(), StoreError> {
        self.ensure_level(level)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.memtable.is_empty() {
            return;
        }
        if let Err(err) = self.flush(false) {
            warn!(%err, "failed to flush memtable on shutdown");
        }
    }
}

fn resolve_tombstone(value: Vec<u8>) -> Vec<u8> {
    if value == TOMBSTONE {
        Vec::new()
    } else {
        value
    }
}
