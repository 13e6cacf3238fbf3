//! Incremental SST writer.
//!
//! Accumulates `(key, value)` pairs (already sorted ascending by key, with
//! unique keys — the flush and compaction paths guarantee this before
//! pushing) and seals them into a single file matching the layout in
//! [`super`]. [`SstBuilder::would_exceed`] lets callers that emit many SSTs
//! back-to-back (compaction) know when to seal the current builder and
//! start a fresh one, so no single file ever exceeds [`super::MAX_SST_SIZE`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::bloom::{BLOOM_BYTES, SstBloom};
use super::{HEADER_LEN, INDEX_RECORD_LEN, MAX_SST_SIZE, SstError, SstHeader};

/// Accumulates entries for one not-yet-sealed SST.
#[derive(Default)]
pub struct SstBuilder {
    entries: Vec<(u64, Vec<u8>)>,
    payload_bytes: u64,
}

impl SstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether appending one more value of `value_len` bytes would push
    /// this builder's sealed size past [`MAX_SST_SIZE`].
    pub fn would_exceed(&self, value_len: usize) -> bool {
        let prospective_count = self.entries.len() as u64 + 1;
        let header_and_index =
            HEADER_LEN + BLOOM_BYTES as u64 + INDEX_RECORD_LEN * prospective_count;
        header_and_index + self.payload_bytes + value_len as u64 > MAX_SST_SIZE
    }

    /// Appends an entry. Caller is responsible for ascending-key, unique-key
    /// ordering and for having checked [`Self::would_exceed`] first.
    pub fn push(&mut self, key: u64, value: Vec<u8>) {
        self.payload_bytes += value.len() as u64;
        self.entries.push((key, value));
    }

    /// Writes the accumulated entries to `<dir>/<timestamp>.sst` and loads
    /// the resulting header back (validating what was just written).
    /// Returns `Ok(None)` if the builder is empty — callers should not seal
    /// an empty builder, but this keeps the API total rather than panicking.
    pub fn seal(self, timestamp: u64, dir: &Path) -> Result<Option<SstHeader>, SstError> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(dir)?;
        let path: PathBuf = dir.join(format!("{timestamp}.sst"));

        let count = self.entries.len() as u64;
        let min_key = self.entries.first().unwrap().0;
        let max_key = self.entries.last().unwrap().0;

        let mut bloom = SstBloom::new();
        for (key, _) in &self.entries {
            bloom.insert(*key);
        }

        let mut index = Vec::with_capacity(self.entries.len());
        let mut running_offset: u32 = 0;
        for (key, value) in &self.entries {
            index.push((*key, running_offset));
            running_offset += value.len() as u32;
        }

        let file = fs::File::create(&path)?;
        let mut w = std::io::BufWriter::new(file);

        w.write_all(&timestamp.to_le_bytes())?;
        w.write_all(&count.to_le_bytes())?;
        w.write_all(&min_key.to_le_bytes())?;
        w.write_all(&max_key.to_le_bytes())?;
        w.write_all(bloom.as_bytes().as_slice())?;
        for (key, offset) in &index {
            w.write_all(&key.to_le_bytes())?;
            w.write_all(&offset.to_le_bytes())?;
        }
        for (_, value) in &self.entries {
            w.write_all(value)?;
        }
        w.flush()?;
        drop(w);

        SstHeader::load(path).map(Some)
    }
}
