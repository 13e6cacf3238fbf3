//! # SSTable Module
//!
//! ## Design Invariants
//!
//! - Every on-disk SST has the exact byte layout below; no variable-length
//!   framing, no stored checksums, no compression. The offset of every
//!   field is derived from `count` alone.
//!
//! ```text
//! offset 0       : timestamp (u64 LE)
//! offset 8       : count     (u64 LE)
//! offset 16      : minKey    (u64 LE)
//! offset 24      : maxKey    (u64 LE)
//! offset 32      : bloom filter, exactly 10240 bytes (81920 bits)
//! offset 10272   : count * (key: u64 LE, offset: u32 LE) index records,
//!                  ascending by key
//! offset 10272+12*count : value payload, raw bytes concatenated in key order
//! ```
//!
//! - `offset[i]` is relative to the payload base (`10272 + 12*count`).
//!   `len[i] = offset[i+1] - offset[i]`, except the last entry, whose
//!   length is `filesize - (payload_base + offset[count-1])`.
//! - Every SST is `<= 2 MiB` including its header.
//! - Files are immutable once sealed: a builder ([`builder::SstBuilder`])
//!   writes a complete file in one pass; nothing is ever appended to or
//!   mutated in an existing SST file.
//!
//! ## Reads
//!
//! Header loading ([`SstHeader::load`]) memory-maps the file once to parse
//! the fixed header, bloom filter, and key index into resident memory (see
//! [`crate::engine`] for how these are cached per level). Value reads never
//! go through the mmap: each [`SstHeader::fetch_value`] call opens the file
//! fresh, seeks to the payload offset, reads exactly `len` bytes, and lets
//! the handle drop — matching the resource discipline in the crate's
//! concurrency model (no cached, mutable file handles; every opened file is
//! closed on every exit path).

pub mod bloom;
pub mod builder;
mod murmur3;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;
use tracing::warn;

use bloom::{BLOOM_BYTES, SstBloom};

/// Length of the fixed header (`timestamp, count, minKey, maxKey`, 8 bytes
/// each).
pub const HEADER_LEN: u64 = 32;
/// Length of one key-index record (`key: u64, offset: u32`).
pub const INDEX_RECORD_LEN: u64 = 12;
/// Maximum size of any single SST file, including its header.
pub const MAX_SST_SIZE: u64 = 2 * 1024 * 1024;

/// Errors surfaced by SST load/read/write operations.
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O failure (open, read, write, seek).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is shorter than its own header claims it should be.
    #[error("SST at {path:?} is truncated: expected at least {expected} bytes, found {actual}")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The header's fields are internally inconsistent (e.g. unsorted
    /// index, `count == 0`, `minKey > maxKey`).
    #[error("SST at {path:?} has an inconsistent header: {reason}")]
    HeaderInconsistent { path: PathBuf, reason: String },
}

/// Byte offset of the payload region, given the entry `count`.
pub fn payload_base(count: u64) -> u64 {
    HEADER_LEN + BLOOM_BYTES as u64 + INDEX_RECORD_LEN * count
}

/// A resident, in-memory representation of one SST's header, bloom filter,
/// and key index — the unit cached per level by [`crate::engine`].
pub struct SstHeader {
    path: PathBuf,
    timestamp: u64,
    count: u64,
    min_key: u64,
    max_key: u64,
    bloom: SstBloom,
    index: Vec<(u64, u32)>,
    file_len: u64,
}

impl SstHeader {
    /// Loads and validates the header, bloom filter, and key index of the
    /// SST at `path`. Rejects (returns `Err`, does not panic) any file
    /// whose header is internally inconsistent or whose payload is
    /// truncated, per the crate's corrupt-SST policy: such files are
    /// skipped rather than registered.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SstError> {
        let path = path.into();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        if file_len < HEADER_LEN + BLOOM_BYTES as u64 {
            return Err(SstError::Truncated {
                path,
                expected: HEADER_LEN + BLOOM_BYTES as u64,
                actual: file_len,
            });
        }

        // SAFETY: the file is not concurrently mutated by this process —
        // SSTs are immutable once sealed, and the engine never writes to a
        // path it has already registered.
        let mmap = unsafe { Mmap::map(&file)? };

        let timestamp = u64::from_le_bytes(mmap[0..8].try_into().unwrap());
        let count = u64::from_le_bytes(mmap[8..16].try_into().unwrap());
        let min_key = u64::from_le_bytes(mmap[16..24].try_into().unwrap());
        let max_key = u64::from_le_bytes(mmap[24..32].try_into().unwrap());

        if count == 0 {
            return Err(SstError::HeaderInconsistent {
                path,
                reason: "count is zero".into(),
            });
        }
        if min_key > max_key {
            return Err(SstError::HeaderInconsistent {
                path,
                reason: format!("minKey {min_key} > maxKey {max_key}"),
            });
        }

        let index_start = (HEADER_LEN + BLOOM_BYTES as u64) as usize;
        let index_len = (INDEX_RECORD_LEN * count) as usize;
        let index_end = index_start + index_len;
        let base = payload_base(count);

        if file_len < base {
            return Err(SstError::Truncated {
                path,
                expected: base,
                actual: file_len,
            });
        }

        let mut bloom_bytes = [0u8; BLOOM_BYTES];
        bloom_bytes.copy_from_slice(&mmap[HEADER_LEN as usize..index_start]);
        let bloom = SstBloom::from_bytes(bloom_bytes);

        let mut index = Vec::with_capacity(count as usize);
        let mut prev_key: Option<u64> = None;
        let mut prev_offset: Option<u32> = None;
        for chunk in mmap[index_start..index_end].chunks_exact(INDEX_RECORD_LEN as usize) {
            let key = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let offset = u32::from_le_bytes(chunk[8..12].try_into().unwrap());
            if let Some(prev) = prev_key {
                if key < prev {
                    return Err(SstError::HeaderInconsistent {
                        path,
                        reason: format!("key index not ascending: {key} follows {prev}"),
                    });
                }
            }
            if let Some(prev) = prev_offset {
                if offset < prev {
                    return Err(SstError::HeaderInconsistent {
                        path,
                        reason: format!("value offset not non-decreasing: {offset} follows {prev}"),
                    });
                }
            }
            prev_key = Some(key);
            prev_offset = Some(offset);
            index.push((key, offset));
        }

        if index.first().map(|(k, _)| *k) != Some(min_key)
            || index.last().map(|(k, _)| *k) != Some(max_key)
        {
            return Err(SstError::HeaderInconsistent {
                path,
                reason: "minKey/maxKey disagree with key index bounds".into(),
            });
        }

        let payload_len = file_len - base;
        if let Some(&(_, last_offset)) = index.last() {
            if last_offset as u64 > payload_len {
                return Err(SstError::HeaderInconsistent {
                    path,
                    reason: format!(
                        "last value offset {last_offset} exceeds payload length {payload_len}"
                    ),
                });
            }
        }

        Ok(Self {
            path,
            timestamp,
            count,
            min_key,
            max_key,
            bloom,
            index,
            file_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min_key(&self) -> u64 {
        self.min_key
    }

    pub fn max_key(&self) -> u64 {
        self.max_key
    }

    /// Whether `[lo, hi]` intersects this SST's `[minKey, maxKey]`.
    pub fn overlaps(&self, lo: u64, hi: u64) -> bool {
        lo <= self.max_key && hi >= self.min_key
    }

    /// Bloom-filter membership probe. `false` is a definite "absent";
    /// `true` means "possibly present."
    pub fn contains_maybe(&self, key: u64) -> bool {
        self.bloom.may_contain(key)
    }

    /// The index of the first entry with `key_at(i) >= key`
    /// (`self.count()` if none).
    pub fn lower_bound(&self, key: u64) -> usize {
        self.index.partition_point(|(k, _)| *k < key)
    }

    pub fn key_at(&self, i: usize) -> u64 {
        self.index[i].0
    }

    pub fn offset_at(&self, i: usize) -> u32 {
        self.index[i].1
    }

    /// Length, in bytes, of the value stored at index `i`. Exposed crate-wide
    /// for the range-scan k-way merge ([`crate::engine`]), which reads
    /// entries by index rather than by key.
    pub(crate) fn value_len_at(&self, i: usize) -> u32 {
        if i + 1 < self.index.len() {
            self.index[i + 1].1 - self.index[i].1
        } else {
            let base = payload_base(self.count);
            (self.file_len - base - self.index[i].1 as u64) as u32
        }
    }

    /// Bloom probe, then binary search on the key index. Returns the
    /// `(offset, len)` pair suitable for [`Self::fetch_value`], or `None`
    /// if the key is definitely or confirmedly absent.
    pub fn search_offset(&self, key: u64) -> Option<(u32, u32)> {
        if !self.contains_maybe(key) {
            return None;
        }
        let i = self.lower_bound(key);
        if i < self.index.len() && self.index[i].0 == key {
            Some((self.index[i].1, self.value_len_at(i)))
        } else {
            None
        }
    }

    /// Reads exactly `len` bytes starting at `offset` within the payload
    /// region. Opens the file fresh, seeks, reads, and drops the handle —
    /// no file handle or value is ever cached.
    pub fn fetch_value(&self, offset: u32, len: u32) -> Result<Vec<u8>, SstError> {
        let mut file = File::open(&self.path)?;
        let start = payload_base(self.count) + offset as u64;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Convenience: full point-lookup against this header, resolving the
    /// offset and reading the value in one call.
    pub fn get(&self, key: u64) -> Result<Option<Vec<u8>>, SstError> {
        match self.search_offset(key) {
            None => Ok(None),
            Some((offset, len)) => self.fetch_value(offset, len).map(Some),
        }
    }
}

/// Removes `path` from disk, logging (not failing) on error — I/O failures
/// during compaction/reset unlink are reported but not fatal, per the
/// crate's error-handling policy.
pub fn unlink(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        warn!(?path, %err, "failed to unlink SST file");
    }
}
