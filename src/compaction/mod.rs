//! # Compaction
//!
//! Leveled compaction: restores the per-level size bound (`2^(L+1)` SSTs
//! at level `L`) by merging the oldest overflowing SSTs of one level down
//! into the next, one level at a time, starting at level 0 and stopping
//! at the first level already within bound.
//!
//! ## Algorithm
//!
//! For the current level `L`:
//!
//! 1. **Select sources.** At `L = 0`, every resident SST participates
//!    (level 0 is allowed to overlap, so there is no smaller well-defined
//!    subset). At `L >= 1`, the oldest `len - bound` SSTs by
//!    `(timestamp, then minKey)` are selected — just enough to bring the
//!    level back within its bound.
//! 2. **Select overlaps.** Every SST at `L+1` whose key range intersects
//!    the merged range of the sources is pulled in too, since `L+1` must
//!    remain pairwise disjoint after the merge.
//! 3. **Merge.** Every entry from sources and overlaps is read out,
//!    tagged with its source level and timestamp, then sorted by
//!    `(key ascending, source level ascending, source timestamp
//!    descending)`. Source-level entries are strictly newer than
//!    overlap-level entries by construction, so this ordering makes the
//!    first occurrence of each key the one to keep.
//! 4. **Drop or keep tombstones.** A tombstone is only dropped from the
//!    output when `L+1` is the bottom level — a tombstone still shadows a
//!    live value at a level below it, so it cannot be dropped earlier.
//! 5. **Emit.** The deduplicated stream is written to one or more new
//!    SSTs at `L+1` via [`crate::sstable::builder::SstBuilder`], splitting
//!    whenever the next entry would exceed the size budget.
//! 6. **Unlink.** The selected source and overlap files are removed from
//!    disk and from the header cache; the new files are already written
//!    by this point, so there is no window where data is missing for
//!    longer than the time to swap headers in memory.
//!
//! The loop then continues at `L+1` with the same bound check, cascading
//! only while the next level is itself over bound; it stops the moment a
//! level already satisfies its bound.

#[cfg(test)]
mod tests;

use crate::engine::{level_bound, Store, StoreError};
use crate::memtable::TOMBSTONE;
use crate::sstable::builder::SstBuilder;
use crate::sstable::{self, SstHeader};

struct TaggedEntry {
    key: u64,
    src_level: usize,
    src_timestamp: u64,
    value: Vec<u8>,
}

/// Restores every level's size bound, starting at level 0.
pub fn compact(store: &mut Store) -> Result<(), StoreError> {
    let mut level = 0usize;

    loop {
        if level as i64 > store.total_level() {
            break;
        }
        let bound = level_bound(level);
        if store.levels()[level].len() <= bound {
            break;
        }

        let mut source_indices: Vec<usize> = (0..store.levels()[level].len()).collect();
        if level > 0 {
            source_indices.sort_by(|&a, &b| {
                let ha = &store.levels()[level][a];
                let hb = &store.levels()[level][b];
                ha.timestamp()
                    .cmp(&hb.timestamp())
                    .then_with(|| ha.min_key().cmp(&hb.min_key()))
            });
            let excess = store.levels()[level].len() - bound;
            source_indices.truncate(excess);
        }
        source_indices.sort_unstable();

        let lo = source_indices
            .iter()
            .map(|&i| store.levels()[level][i].min_key())
            .min()
            .expect("non-empty source selection");
        let hi = source_indices
            .iter()
            .map(|&i| store.levels()[level][i].max_key())
            .max()
            .expect("non-empty source selection");

        let next_level = level + 1;
        store.ensure_level_pub(next_level)?;

        let mut overlap_indices: Vec<usize> = store.levels()[next_level]
            .iter()
            .enumerate()
            .filter(|(_, h)| h.overlaps(lo, hi))
            .map(|(i, _)| i)
            .collect();
        overlap_indices.sort_unstable();

        let mut sources: Vec<SstHeader> = Vec::with_capacity(source_indices.len());
        for &i in source_indices.iter().rev() {
            sources.push(store.levels_mut()[level].remove(i));
        }
        let mut overlaps: Vec<SstHeader> = Vec::with_capacity(overlap_indices.len());
        for &i in overlap_indices.iter().rev() {
            overlaps.push(store.levels_mut()[next_level].remove(i));
        }

        let mut entries: Vec<TaggedEntry> = Vec::new();
        for header in &sources {
            read_all(header, level, &mut entries)?;
        }
        for header in &overlaps {
            read_all(header, next_level, &mut entries)?;
        }

        entries.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.src_level.cmp(&b.src_level))
                .then_with(|| b.src_timestamp.cmp(&a.src_timestamp))
        });

        let drop_tombstones = next_level as i64 == store.total_level();

        let dir = store.level_path(next_level);
        let mut builder = SstBuilder::new();
        let mut new_headers = Vec::new();
        let mut last_key: Option<u64> = None;

        for entry in entries {
            if last_key == Some(entry.key) {
                continue;
            }
            last_key = Some(entry.key);

            if drop_tombstones && entry.value.as_slice() == TOMBSTONE {
                continue;
            }

            if !builder.is_empty() && builder.would_exceed(entry.value.len()) {
                seal_into(&mut builder, store, &dir, &mut new_headers)?;
            }
            builder.push(entry.key, entry.value);
        }
        if !builder.is_empty() {
            seal_into(&mut builder, store, &dir, &mut new_headers)?;
        }

        for header in sources.iter().chain(overlaps.iter()) {
            sstable::unlink(header.path());
        }

        store.levels_mut()[next_level].extend(new_headers);

        level = next_level;
    }

    Ok(())
}

fn read_all(
    header: &SstHeader,
    src_level: usize,
    out: &mut Vec<TaggedEntry>,
) -> Result<(), StoreError> {
    for i in 0..header.count() as usize {
        let offset = header.offset_at(i);
        let len = header.value_len_at(i);
        let value = header.fetch_value(offset, len)?;
        out.push(TaggedEntry {
            key: header.key_at(i),
            src_level,
            src_timestamp: header.timestamp(),
            value,
        });
    }
    Ok(())
}

fn seal_into(
    builder: &mut SstBuilder,
    store: &mut Store,
    dir: &std::path::Path,
    new_headers: &mut Vec<SstHeader>,
) -> Result<(), StoreError> {
    let timestamp = store.take_next_timestamp();
    let finished = std::mem::take(builder);
    if let Some(header) = finished.seal(timestamp, dir)? {
        new_headers.push(header);
    }
    Ok(())
}
