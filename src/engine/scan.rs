//! Range scan: a k-way merge across the memtable and every resident SST
//! whose key range intersects `[k1, k2]`.
//!
//! Each source contributes a cursor of ascending `(key, value)` pairs
//! already restricted to the scan range. Cursors are merged through a
//! min-heap ordered by `(key ascending, timestamp descending)`, so that
//! when several cursors agree on a key, the newest source's entry is
//! popped first; later duplicates of the same key are then discarded.
//! The memtable is treated as though it carries timestamp `u64::MAX` — it
//! is always the newest source. Tombstones are dropped from the emitted
//! output, not from the dedup accounting.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::memtable::{Memtable, TOMBSTONE};
use crate::sstable::{SstError, SstHeader};

enum Cursor<'a> {
    Mem { entries: Vec<(u64, Vec<u8>)>, next: usize },
    Sst { header: &'a SstHeader, next: usize, end: usize },
}

impl<'a> Cursor<'a> {
    fn advance(&mut self) -> Result<Option<(u64, u64, Vec<u8>)>, SstError> {
        match self {
            Cursor::Mem { entries, next } => {
                if *next >= entries.len() {
                    return Ok(None);
                }
                let (key, value) = entries[*next].clone();
                *next += 1;
                Ok(Some((key, u64::MAX, value)))
            }
            Cursor::Sst { header, next, end } => {
                if *next >= *end {
                    return Ok(None);
                }
                let i = *next;
                *next += 1;
                let key = header.key_at(i);
                let offset = header.offset_at(i);
                let len = header.value_len_at(i);
                let value = header.fetch_value(offset, len)?;
                Ok(Some((key, header.timestamp(), value)))
            }
        }
    }
}

struct HeapItem {
    key: u64,
    timestamp: u64,
    value: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.timestamp == other.timestamp
    }
}
impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse key so the smallest key sorts
        // greatest (pops first), and keep timestamp in normal order so
        // the newest entry for an equal key also pops first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
    }
}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Appends every live key in `[k1, k2]` to `out`, ascending, deduplicated
/// to the newest source per key, tombstones filtered.
pub fn range_scan(
    memtable: &Memtable,
    levels: &[Vec<SstHeader>],
    k1: u64,
    k2: u64,
    out: &mut Vec<(u64, Vec<u8>)>,
) -> Result<(), crate::engine::StoreError> {
    if k1 > k2 {
        return Ok(());
    }

    let mut mem_entries = Vec::new();
    memtable.scan(k1, k2, &mut mem_entries);

    let mut cursors: Vec<Cursor> = vec![Cursor::Mem { entries: mem_entries, next: 0 }];

    for level in levels {
        for header in level {
            if !header.overlaps(k1, k2) {
                continue;
            }
            let start = header.lower_bound(k1);
            let end = if k2 == u64::MAX {
                header.count() as usize
            } else {
                header.lower_bound(k2 + 1)
            };
            if start < end {
                cursors.push(Cursor::Sst { header, next: start, end });
            }
        }
    }

    let mut heap: BinaryHeap<HeapItem> = BinaryHeap::new();
    for (idx, cursor) in cursors.iter_mut().enumerate() {
        if let Some((key, timestamp, value)) = cursor.advance().map_err(crate::engine::StoreError::from)? {
            heap.push(HeapItem { key, timestamp, value, source: idx });
        }
    }

    let mut last_emitted: Option<u64> = None;
    while let Some(item) = heap.pop() {
        if let Some((key, timestamp, value)) = cursors[item.source]
            .advance()
            .map_err(crate::engine::StoreError::from)?
        {
            heap.push(HeapItem { key, timestamp, value, source: item.source });
        }

        if last_emitted == Some(item.key) {
            continue;
        }
        last_emitted = Some(item.key);

        if item.value.as_slice() == TOMBSTONE {
            continue;
        }
        out.push((item.key, item.value));
    }

    Ok(())
}
